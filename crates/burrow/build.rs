use anyhow::Result;
use vergen_gitcl::{Emitter, GitclBuilder};

pub fn main() -> Result<()> {
    // `--version` prints the commit; builds outside a git checkout get a placeholder
    if Emitter::default()
        .add_instructions(&GitclBuilder::all_git()?)?
        .emit()
        .is_err()
    {
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
    Ok(())
}
