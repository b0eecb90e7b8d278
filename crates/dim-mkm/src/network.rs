//! Entity network types.
//!
//! One byte inside every address classifies the entity it names. The group
//! bit (0x10) marks multi-member entities.

/// Network/entity type byte carried in the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityType {
    User = 0x08,
    Group = 0x10,
    Station = 0x88,
    Bot = 0xC8,
}

impl EntityType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x08 => Some(Self::User),
            0x10 => Some(Self::Group),
            0x88 => Some(Self::Station),
            0xC8 => Some(Self::Bot),
            _ => None,
        }
    }
}

pub const USER: u8 = EntityType::User as u8;
pub const GROUP: u8 = EntityType::Group as u8;
pub const STATION: u8 = EntityType::Station as u8;
pub const BOT: u8 = EntityType::Bot as u8;

/// Group entities carry the group bit.
pub fn is_group(network: u8) -> bool {
    network & GROUP == GROUP
}

pub fn is_user(network: u8) -> bool {
    !is_group(network)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_user(USER));
        assert!(is_user(STATION));
        assert!(is_user(BOT));
        assert!(is_group(GROUP));
        assert!(!is_group(USER));
    }

    #[test]
    fn test_from_byte() {
        assert_eq!(EntityType::from_byte(0x08), Some(EntityType::User));
        assert_eq!(EntityType::from_byte(0x42), None);
    }
}
