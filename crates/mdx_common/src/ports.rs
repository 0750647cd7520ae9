//! Port allocation for dictionary servers
//!
//! Either every server gets a kernel-assigned port, or ports come from a
//! fixed window probed in order. The allocator never opens sockets itself:
//! callers pass the bind operation in, which keeps it testable.

use std::io;
use tracing::debug;

/// Environment variables selecting the constrained policy
pub const SUB_PORT_START_ENV: &str = "SUB_PORT_START";
pub const SUB_PORT_END_ENV: &str = "SUB_PORT_END";

/// Port allocation errors
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Port range {start}-{end} exhausted before every dictionary was served")]
    Exhausted { start: u16, end: u16 },

    #[error("Invalid port range {start}-{end}: start must not exceed end")]
    InvalidRange { start: u16, end: u16 },

    #[error("Invalid port range: {0}")]
    InvalidEnv(String),
}

/// How dictionary servers obtain their ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortPolicy {
    /// Bind port 0 and let the kernel choose
    #[default]
    Ephemeral,
    /// Probe an inclusive window in order
    Range { start: u16, end: u16 },
}

impl PortPolicy {
    pub fn range(start: u16, end: u16) -> Result<Self, PortError> {
        if start > end {
            return Err(PortError::InvalidRange { start, end });
        }
        Ok(PortPolicy::Range { start, end })
    }

    /// Read `SUB_PORT_START`/`SUB_PORT_END` from the process environment.
    ///
    /// `Ok(None)` when neither is set. One without the other is an error.
    pub fn from_env() -> Result<Option<Self>, PortError> {
        Self::from_vars(
            std::env::var(SUB_PORT_START_ENV).ok(),
            std::env::var(SUB_PORT_END_ENV).ok(),
        )
    }

    pub fn from_vars(start: Option<String>, end: Option<String>) -> Result<Option<Self>, PortError> {
        match (start, end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => {
                let start = parse_port(SUB_PORT_START_ENV, &start)?;
                let end = parse_port(SUB_PORT_END_ENV, &end)?;
                Self::range(start, end).map(Some)
            }
            (Some(_), None) => Err(PortError::InvalidEnv(format!(
                "{} is set but {} is not",
                SUB_PORT_START_ENV, SUB_PORT_END_ENV
            ))),
            (None, Some(_)) => Err(PortError::InvalidEnv(format!(
                "{} is set but {} is not",
                SUB_PORT_END_ENV, SUB_PORT_START_ENV
            ))),
        }
    }

    /// Allocator for this policy, `None` for ephemeral ports
    pub fn allocator(&self) -> Option<PortAllocator> {
        match *self {
            PortPolicy::Ephemeral => None,
            PortPolicy::Range { start, end } => Some(PortAllocator {
                start,
                end,
                cursor: u32::from(start),
            }),
        }
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16, PortError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| PortError::InvalidEnv(format!("{}={:?}: {}", var, value, e)))
}

/// Sequential allocator over an inclusive port window.
///
/// The cursor only moves forward: a port that failed to bind, or was handed
/// out, is never probed again by this allocator.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    cursor: u32,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16) -> Result<Self, PortError> {
        match PortPolicy::range(start, end)?.allocator() {
            Some(allocator) => Ok(allocator),
            None => Err(PortError::InvalidRange { start, end }),
        }
    }

    /// Ports not yet probed
    pub fn remaining(&self) -> usize {
        (u32::from(self.end) + 1).saturating_sub(self.cursor) as usize
    }

    /// Bind the next port that accepts `bind`.
    ///
    /// Ports whose bind fails (in use, permission denied, ...) are skipped.
    pub fn next<T, F>(&mut self, mut bind: F) -> Result<(u16, T), PortError>
    where
        F: FnMut(u16) -> io::Result<T>,
    {
        while self.cursor <= u32::from(self.end) {
            let port = self.cursor as u16;
            self.cursor += 1;
            match bind(port) {
                Ok(bound) => return Ok((port, bound)),
                Err(e) => debug!(port, "Port unavailable: {}", e),
            }
        }
        Err(PortError::Exhausted {
            start: self.start,
            end: self.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refuse(port: u16) -> io::Error {
        io::Error::new(io::ErrorKind::AddrInUse, format!("{} in use", port))
    }

    #[test]
    fn test_allocates_in_order() {
        let mut alloc = PortAllocator::new(4000, 4002).unwrap();
        assert_eq!(alloc.next(Ok).unwrap().0, 4000);
        assert_eq!(alloc.next(Ok).unwrap().0, 4001);
        assert_eq!(alloc.next(Ok).unwrap().0, 4002);
        assert!(matches!(
            alloc.next(Ok),
            Err(PortError::Exhausted { start: 4000, end: 4002 })
        ));
    }

    #[test]
    fn test_skips_ports_that_fail_to_bind() {
        let mut alloc = PortAllocator::new(4000, 4005).unwrap();
        let (port, _) = alloc
            .next(|p| if p < 4003 { Err(refuse(p)) } else { Ok(()) })
            .unwrap();
        assert_eq!(port, 4003);
        assert_eq!(alloc.remaining(), 2);
    }

    #[test]
    fn test_exhausted_when_nothing_binds() {
        let mut alloc = PortAllocator::new(4000, 4001).unwrap();
        let err = alloc.next(|p| Err::<(), _>(refuse(p))).unwrap_err();
        assert!(err.to_string().contains("4000-4001"));
    }

    #[test]
    fn test_top_of_port_space_does_not_overflow() {
        let mut alloc = PortAllocator::new(65534, 65535).unwrap();
        assert_eq!(alloc.next(Ok).unwrap().0, 65534);
        assert_eq!(alloc.next(Ok).unwrap().0, 65535);
        assert!(alloc.next(Ok).is_err());
        assert_eq!(alloc.remaining(), 0);
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            PortAllocator::new(5000, 4000),
            Err(PortError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_policy_from_vars() {
        assert_eq!(PortPolicy::from_vars(None, None).unwrap(), None);
        assert_eq!(
            PortPolicy::from_vars(Some("20000".into()), Some(" 20010 ".into())).unwrap(),
            Some(PortPolicy::Range { start: 20000, end: 20010 })
        );
        assert!(PortPolicy::from_vars(Some("20000".into()), None).is_err());
        assert!(PortPolicy::from_vars(Some("abc".into()), Some("20010".into())).is_err());
        assert!(PortPolicy::from_vars(Some("20010".into()), Some("20000".into())).is_err());
    }

    #[test]
    fn test_ephemeral_has_no_allocator() {
        assert!(PortPolicy::Ephemeral.allocator().is_none());
    }
}
