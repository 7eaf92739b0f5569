//! Response status codes.

use std::fmt;

/// Status carried in the vbucket field of response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(pub u16);

impl Status {
    pub const SUCCESS: Status = Status(0x00);
    pub const KEY_NOT_FOUND: Status = Status(0x01);
    pub const KEY_EXISTS: Status = Status(0x02);
    pub const TOO_BIG: Status = Status(0x03);
    pub const INVALID: Status = Status(0x04);
    pub const NOT_STORED: Status = Status(0x05);
    pub const NOT_MY_PARTITION: Status = Status(0x07);
    pub const OUT_OF_RANGE: Status = Status(0x22);
    pub const ROLLBACK: Status = Status(0x23);
    pub const UNKNOWN_COMMAND: Status = Status(0x81);
    pub const OUT_OF_MEMORY: Status = Status(0x82);
    pub const TEMPORARY_FAILURE: Status = Status(0x86);

    #[inline]
    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }

    #[inline]
    pub fn is_rollback(self) -> bool {
        self == Status::ROLLBACK
    }

    /// Symbolic name, if the code is one we know.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::SUCCESS => "SUCCESS",
            Status::KEY_NOT_FOUND => "KEY_ENOENT",
            Status::KEY_EXISTS => "KEY_EEXISTS",
            Status::TOO_BIG => "E2BIG",
            Status::INVALID => "EINVAL",
            Status::NOT_STORED => "NOT_STORED",
            Status::NOT_MY_PARTITION => "NOT_MY_VBUCKET",
            Status::OUT_OF_RANGE => "ERANGE",
            Status::ROLLBACK => "ROLLBACK",
            Status::UNKNOWN_COMMAND => "UNKNOWN_COMMAND",
            Status::OUT_OF_MEMORY => "ENOMEM",
            Status::TEMPORARY_FAILURE => "TMPFAIL",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:02x})", name, self.0),
            None => write!(f, "0x{:02x}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::ROLLBACK.to_string(), "ROLLBACK (0x23)");
        assert_eq!(Status(0x4242).to_string(), "0x4242");
    }

    #[test]
    fn test_status_predicates() {
        assert!(Status::default().is_success());
        assert!(Status::ROLLBACK.is_rollback());
        assert!(!Status::NOT_MY_PARTITION.is_success());
    }
}
