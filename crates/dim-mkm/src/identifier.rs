//! Entity identifiers: `name@address/terminal`.
//!
//! The name is an optional human handle, the address is the self-certifying
//! part, the terminal tags a login device and is ignored for equality.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::address::Address;
use crate::error::MkmError;

#[derive(Debug, Clone)]
pub struct ID {
    name: Option<String>,
    address: Address,
    terminal: Option<String>,
}

impl ID {
    pub fn new(name: Option<&str>, address: Address, terminal: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_owned),
            address,
            terminal: terminal.map(str::to_owned),
        }
    }

    /// `anyone@anywhere` — any user, bypasses encryption.
    pub fn anyone() -> Self {
        Self::new(Some("anyone"), Address::Anywhere, None)
    }

    /// `everyone@everywhere` — any group, bypasses encryption.
    pub fn everyone() -> Self {
        Self::new(Some("everyone"), Address::Everywhere, None)
    }

    /// Parse `[name@]address[/terminal]`.
    pub fn parse(text: &str) -> Result<Self, MkmError> {
        let (body, terminal) = match text.split_once('/') {
            Some((body, terminal)) if !terminal.is_empty() => (body, Some(terminal)),
            Some((body, _)) => (body, None),
            None => (text, None),
        };
        let (name, address) = match body.split_once('@') {
            Some((name, address)) if !name.is_empty() => (Some(name), address),
            Some((_, address)) => (None, address),
            None => (None, body),
        };
        if address.is_empty() {
            return Err(MkmError::InvalidFormat(format!("identifier: {text}")));
        }
        Ok(Self::new(name, Address::parse(address)?, terminal))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn terminal(&self) -> Option<&str> {
        self.terminal.as_deref()
    }

    /// The entity type byte of the address.
    pub fn network(&self) -> u8 {
        self.address.network()
    }

    pub fn is_broadcast(&self) -> bool {
        self.address.is_broadcast()
    }

    pub fn is_user(&self) -> bool {
        self.address.is_user()
    }

    pub fn is_group(&self) -> bool {
        self.address.is_group()
    }
}

// equality on (name, address); the terminal is a device tag
impl PartialEq for ID {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.address == other.address
    }
}

impl Eq for ID {}

impl Hash for ID {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}@")?;
        }
        write!(f, "{}", self.address)?;
        if let Some(terminal) = &self.terminal {
            write!(f, "/{terminal}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moki() {
        let id = ID::parse("moki@4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk").unwrap();
        assert_eq!(id.name(), Some("moki"));
        assert_eq!(
            id.address().to_string(),
            "4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk"
        );
        assert!(id.terminal().is_none());
        assert_eq!(id.to_string(), "moki@4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk");
    }

    #[test]
    fn test_parse_with_terminal() {
        let id = ID::parse("moki@4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk/home").unwrap();
        assert_eq!(id.terminal(), Some("home"));

        // terminal does not affect equality or hashing
        let bare = ID::parse("moki@4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk").unwrap();
        assert_eq!(id, bare);
    }

    #[test]
    fn test_broadcast_ids() {
        let anyone = ID::anyone();
        assert!(anyone.is_broadcast());
        assert!(anyone.is_user());
        assert_eq!(anyone.to_string(), "anyone@anywhere");
        assert_eq!(ID::parse("anyone@anywhere").unwrap(), anyone);

        let everyone = ID::everyone();
        assert!(everyone.is_broadcast());
        assert!(everyone.is_group());
        assert_eq!(ID::parse("everyone@everywhere").unwrap(), everyone);
    }

    #[test]
    fn test_bad_identifiers() {
        assert!(ID::parse("").is_err());
        assert!(ID::parse("name@").is_err());
        assert!(ID::parse("not-an-address").is_err());
    }
}
