//! Signal names as accepted by `kill`: a number, `TERM` or `SIGTERM`,
//! case-insensitive.

use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal as NixSignal;

/// POSIX Signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal(NixSignal);

#[derive(Debug, thiserror::Error)]
pub enum SignalError<T> {
    #[error("invalid signal: {0}")]
    InvalidSignal(T),
}

impl FromStr for Signal {
    type Err = SignalError<String>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignalError::InvalidSignal(s.to_string());

        if let Ok(number) = s.parse::<i32>() {
            return NixSignal::try_from(number)
                .map(Signal)
                .map_err(|_| invalid());
        }

        let upper = s.to_ascii_uppercase();
        let name = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };

        // aliases nix does not know about
        let name = match name.as_str() {
            "SIGIOT" => "SIGABRT".to_string(),
            "SIGPOLL" => "SIGIO".to_string(),
            _ => name,
        };

        NixSignal::from_str(&name).map(Signal).map_err(|_| invalid())
    }
}

impl TryFrom<&str> for Signal {
    type Error = SignalError<String>;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError<i32>;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        NixSignal::try_from(value)
            .map_err(|_| SignalError::InvalidSignal(value))
            .map(Signal)
    }
}

impl From<NixSignal> for Signal {
    fn from(s: NixSignal) -> Self {
        Signal(s)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Signal {
    pub fn into_raw(self) -> NixSignal {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal::*;

    #[test]
    fn test_conversion_from_string() {
        let cases = [
            ("9", SIGKILL),
            ("KILL", SIGKILL),
            ("kill", SIGKILL),
            ("SIGKILL", SIGKILL),
            ("sigterm", SIGTERM),
            ("15", SIGTERM),
            ("HUP", SIGHUP),
            ("IOT", SIGABRT),
            ("SIGWINCH", SIGWINCH),
        ];
        for (input, expected) in cases {
            let signal: Signal = input.parse().unwrap();
            assert_eq!(signal.into_raw(), expected, "parsing {input}");
        }
    }

    #[test]
    fn test_conversion_from_string_should_be_failed() {
        assert!("invalid".parse::<Signal>().is_err());
        assert!("0".parse::<Signal>().is_err());
        assert!("-1".parse::<Signal>().is_err());
        assert!("SIG".parse::<Signal>().is_err());
    }

    #[test]
    fn test_conversion_from_i32() {
        assert_eq!(Signal::try_from(2).unwrap().into_raw(), SIGINT);
        assert!(Signal::try_from(100).is_err());
    }

    quickcheck! {
        fn prop_number_and_name_agree(n: u8) -> bool {
            match NixSignal::try_from(n as i32) {
                Ok(sig) => {
                    let by_number: Signal = n.to_string().parse().unwrap();
                    let by_name: Signal = sig.as_str().parse().unwrap();
                    by_number == by_name
                }
                Err(_) => n.to_string().parse::<Signal>().is_err(),
            }
        }
    }
}
