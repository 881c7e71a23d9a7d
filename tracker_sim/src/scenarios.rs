//! Scripted collector behaviors for resilience runs.

/// How a collector peer treats a connecting device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Accept the handshake and acknowledge every frame
    Accept,

    /// Answer the handshake with this (non-0x01) byte, then close
    Reject(u8),

    /// Accept, acknowledge n-1 frames, close on the n-th without acking it
    CloseAfter(u32),

    /// Accept the TCP connection but never answer the handshake
    Silent,

    /// Refuse the connection outright
    Refuse,
}

impl PeerBehavior {
    /// Returns one instance of every behavior.
    pub fn all() -> Vec<PeerBehavior> {
        vec![
            PeerBehavior::Accept,
            PeerBehavior::Reject(0x00),
            PeerBehavior::CloseAfter(1),
            PeerBehavior::Silent,
            PeerBehavior::Refuse,
        ]
    }

    /// Returns the behavior name.
    pub fn name(&self) -> &'static str {
        match self {
            PeerBehavior::Accept => "accept",
            PeerBehavior::Reject(_) => "reject",
            PeerBehavior::CloseAfter(_) => "close_after",
            PeerBehavior::Silent => "silent",
            PeerBehavior::Refuse => "refuse",
        }
    }

    /// Returns a description of the behavior.
    pub fn description(&self) -> &'static str {
        match self {
            PeerBehavior::Accept => "Acknowledge the handshake and every frame",
            PeerBehavior::Reject(_) => "Send a non-0x01 handshake reply and hang up",
            PeerBehavior::CloseAfter(_) => "Hang up on the n-th frame without acknowledging it",
            PeerBehavior::Silent => "Hold the socket open and never reply",
            PeerBehavior::Refuse => "Refuse the connection",
        }
    }
}

impl Default for PeerBehavior {
    fn default() -> Self {
        PeerBehavior::Accept
    }
}

impl std::fmt::Display for PeerBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerBehavior::Reject(code) => write!(f, "reject:{code}"),
            PeerBehavior::CloseAfter(n) => write!(f, "close_after:{n}"),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl std::str::FromStr for PeerBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let (name, arg) = match lower.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (lower.as_str(), None),
        };

        let parse_arg = |default: u32| -> Result<u32, String> {
            arg.map_or(Ok(default), |a| {
                a.parse().map_err(|_| format!("Invalid argument for {name}: {a}"))
            })
        };

        match name {
            "accept" | "ok" => Ok(PeerBehavior::Accept),
            "reject" => {
                let code = parse_arg(0)?;
                match u8::try_from(code) {
                    Ok(0x01) => Err("reject code must not be 0x01".to_string()),
                    Ok(code) => Ok(PeerBehavior::Reject(code)),
                    Err(_) => Err(format!("reject code out of range: {code}")),
                }
            }
            "close_after" | "closeafter" => match parse_arg(1)? {
                0 => Err("close_after needs at least one frame".to_string()),
                n => Ok(PeerBehavior::CloseAfter(n)),
            },
            "drop_after_one" => Ok(PeerBehavior::CloseAfter(1)),
            "silent" => Ok(PeerBehavior::Silent),
            "refuse" => Ok(PeerBehavior::Refuse),
            _ => Err(format!("Unknown peer behavior: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_behaviors() {
        assert_eq!("accept".parse::<PeerBehavior>(), Ok(PeerBehavior::Accept));
        assert_eq!("reject".parse::<PeerBehavior>(), Ok(PeerBehavior::Reject(0)));
        assert_eq!("reject:2".parse::<PeerBehavior>(), Ok(PeerBehavior::Reject(2)));
        assert_eq!("close_after:3".parse::<PeerBehavior>(), Ok(PeerBehavior::CloseAfter(3)));
        assert_eq!("drop_after_one".parse::<PeerBehavior>(), Ok(PeerBehavior::CloseAfter(1)));
        assert_eq!("SILENT".parse::<PeerBehavior>(), Ok(PeerBehavior::Silent));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("reject:1".parse::<PeerBehavior>().is_err());
        assert!("reject:300".parse::<PeerBehavior>().is_err());
        assert!("close_after:0".parse::<PeerBehavior>().is_err());
        assert!("teleport".parse::<PeerBehavior>().is_err());
    }

    #[test]
    fn test_every_behavior_is_described() {
        let all = PeerBehavior::all();
        let mut descriptions: Vec<_> = all.iter().map(|b| b.description()).collect();
        assert!(descriptions.iter().all(|d| !d.is_empty()));
        descriptions.sort_unstable();
        descriptions.dedup();
        assert_eq!(descriptions.len(), all.len());
    }

    #[test]
    fn test_display_roundtrips() {
        for behavior in PeerBehavior::all() {
            assert_eq!(behavior.to_string().parse::<PeerBehavior>(), Ok(behavior));
        }
    }
}
