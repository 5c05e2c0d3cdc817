//! Control groups place the container's processes under a named group of the
//! host hierarchy so that they can be accounted for and killed as a unit.
//! Only attaching and detaching is handled here, resource limits are left to
//! the hierarchy's owner.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod test;

pub mod common;
pub mod v1;
pub mod v2;
