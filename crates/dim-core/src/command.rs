//! Commands: contents with a `command` name key.
//!
//! Entity commands (meta/document) move identity artifacts, group commands
//! mutate membership, and the rest are session-level protocol extras. Group
//! commands are history contents (type 0x89); the others are plain commands
//! (type 0x88). Unknown command names are preserved as [`BaseCommand`].

use serde_json::Value;

use dim_crypto::coder::{self, Dict};
use dim_mkm::{Document, Meta, ID};

use crate::content::{content_type, new_content_dict, Content};
use crate::error::CoreError;
use crate::message::ReliableMessage;

pub mod command_name {
    pub const META: &str = "meta";
    pub const DOCUMENT: &str = "document";
    pub const RECEIPT: &str = "receipt";
    pub const LOGIN: &str = "login";
    pub const BLOCK: &str = "block";
    pub const MUTE: &str = "mute";
    pub const HANDSHAKE: &str = "handshake";
    pub const STORAGE: &str = "storage";

    pub const INVITE: &str = "invite";
    pub const EXPEL: &str = "expel";
    pub const QUIT: &str = "quit";
    pub const RESET: &str = "reset";
    pub const QUERY: &str = "query";
}

#[derive(Clone)]
pub enum Command {
    Meta(MetaCommand),
    Document(DocumentCommand),
    Group(GroupCommand),
    Receipt(ReceiptCommand),
    Login(BaseCommand),
    Block(BaseCommand),
    Mute(BaseCommand),
    Handshake(BaseCommand),
    Storage(BaseCommand),
    Other(BaseCommand),
}

impl Command {
    pub fn parse(dict: Dict) -> Result<Self, CoreError> {
        let name = coder::get_str(&dict, "command")
            .ok_or_else(|| CoreError::InvalidFormat("command without name".into()))?
            .to_owned();
        Ok(match name.as_str() {
            command_name::META => Self::Meta(MetaCommand { dict }),
            command_name::DOCUMENT => Self::Document(DocumentCommand { dict }),
            command_name::INVITE | command_name::EXPEL | command_name::QUIT
            | command_name::RESET | command_name::QUERY => {
                Self::Group(GroupCommand { dict })
            }
            command_name::RECEIPT => Self::Receipt(ReceiptCommand { dict }),
            command_name::LOGIN => Self::Login(BaseCommand { dict }),
            command_name::BLOCK => Self::Block(BaseCommand { dict }),
            command_name::MUTE => Self::Mute(BaseCommand { dict }),
            command_name::HANDSHAKE => Self::Handshake(BaseCommand { dict }),
            command_name::STORAGE => Self::Storage(BaseCommand { dict }),
            _ => Self::Other(BaseCommand { dict }),
        })
    }

    pub fn name(&self) -> &str {
        coder::get_str(self.as_dict(), "command").unwrap_or_default()
    }

    pub fn as_dict(&self) -> &Dict {
        match self {
            Self::Meta(c) => &c.dict,
            Self::Document(c) => &c.dict,
            Self::Group(c) => &c.dict,
            Self::Receipt(c) => &c.dict,
            Self::Login(c) | Self::Block(c) | Self::Mute(c) | Self::Handshake(c)
            | Self::Storage(c) | Self::Other(c) => &c.dict,
        }
    }

    pub fn into_dict(self) -> Dict {
        match self {
            Self::Meta(c) => c.dict,
            Self::Document(c) => c.dict,
            Self::Group(c) => c.dict,
            Self::Receipt(c) => c.dict,
            Self::Login(c) | Self::Block(c) | Self::Mute(c) | Self::Handshake(c)
            | Self::Storage(c) | Self::Other(c) => c.dict,
        }
    }

    pub(crate) fn dict_mut(&mut self) -> &mut Dict {
        match self {
            Self::Meta(c) => &mut c.dict,
            Self::Document(c) => &mut c.dict,
            Self::Group(c) => &mut c.dict,
            Self::Receipt(c) => &mut c.dict,
            Self::Login(c) | Self::Block(c) | Self::Mute(c) | Self::Handshake(c)
            | Self::Storage(c) | Self::Other(c) => &mut c.dict,
        }
    }
}

fn new_command_dict(name: &str) -> Dict {
    let mut dict = new_content_dict(content_type::COMMAND);
    dict.insert("command".into(), Value::from(name));
    dict
}

#[derive(Clone)]
pub struct MetaCommand {
    pub(crate) dict: Dict,
}

impl MetaCommand {
    /// Ask a peer (or station) for the meta of `identifier`.
    pub fn query(identifier: &ID) -> Self {
        let mut dict = new_command_dict(command_name::META);
        dict.insert("ID".into(), Value::from(identifier.to_string()));
        Self { dict }
    }

    /// Answer a query with a cached meta.
    pub fn response(identifier: &ID, meta: &Meta) -> Self {
        let mut command = Self::query(identifier);
        command
            .dict
            .insert("meta".into(), Value::Object(meta.to_dict().clone()));
        command
    }

    pub fn identifier(&self) -> Result<ID, CoreError> {
        let text = coder::get_str(&self.dict, "ID")
            .ok_or_else(|| CoreError::InvalidFormat("meta command without ID".into()))?;
        Ok(ID::parse(text)?)
    }

    pub fn meta(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "meta")
    }
}

#[derive(Clone)]
pub struct DocumentCommand {
    pub(crate) dict: Dict,
}

impl DocumentCommand {
    /// Ask for documents newer than `last_time`.
    pub fn query(identifier: &ID, last_time: Option<f64>) -> Self {
        let mut dict = new_command_dict(command_name::DOCUMENT);
        dict.insert("ID".into(), Value::from(identifier.to_string()));
        if let Some(time) = last_time {
            dict.insert("last_time".into(), Value::from(time));
        }
        Self { dict }
    }

    /// Answer with a document, attaching the meta for first contact.
    pub fn response(identifier: &ID, meta: Option<&Meta>, document: &Document) -> Self {
        let mut command = Self::query(identifier, None);
        if let Some(meta) = meta {
            command
                .dict
                .insert("meta".into(), Value::Object(meta.to_dict().clone()));
        }
        command
            .dict
            .insert("document".into(), Value::Object(document.to_dict().clone()));
        command
    }

    pub fn identifier(&self) -> Result<ID, CoreError> {
        let text = coder::get_str(&self.dict, "ID")
            .ok_or_else(|| CoreError::InvalidFormat("document command without ID".into()))?;
        Ok(ID::parse(text)?)
    }

    pub fn meta(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "meta")
    }

    pub fn document(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "document")
    }

    pub fn last_time(&self) -> Option<f64> {
        coder::get_f64(&self.dict, "last_time")
    }
}

/// Group history command: INVITE / EXPEL / QUIT / RESET / QUERY.
#[derive(Clone)]
pub struct GroupCommand {
    pub(crate) dict: Dict,
}

impl GroupCommand {
    fn new(name: &str, group: &ID) -> Self {
        let mut dict = new_content_dict(content_type::HISTORY);
        dict.insert("command".into(), Value::from(name));
        dict.insert("group".into(), Value::from(group.to_string()));
        Self { dict }
    }

    fn with_members(name: &str, group: &ID, members: &[ID]) -> Self {
        let mut command = Self::new(name, group);
        let list: Vec<Value> = members
            .iter()
            .map(|member| Value::from(member.to_string()))
            .collect();
        command.dict.insert("members".into(), Value::from(list));
        command
    }

    pub fn invite(group: &ID, members: &[ID]) -> Self {
        Self::with_members(command_name::INVITE, group, members)
    }

    pub fn expel(group: &ID, members: &[ID]) -> Self {
        Self::with_members(command_name::EXPEL, group, members)
    }

    pub fn quit(group: &ID) -> Self {
        Self::new(command_name::QUIT, group)
    }

    pub fn reset(group: &ID, members: &[ID]) -> Self {
        Self::with_members(command_name::RESET, group, members)
    }

    pub fn query(group: &ID) -> Self {
        // queries are plain commands, not history
        let mut command = Self::new(command_name::QUERY, group);
        command
            .dict
            .insert("type".into(), Value::from(content_type::COMMAND));
        command
    }

    pub fn name(&self) -> &str {
        coder::get_str(&self.dict, "command").unwrap_or_default()
    }

    pub fn group(&self) -> Result<ID, CoreError> {
        let text = coder::get_str(&self.dict, "group")
            .ok_or_else(|| CoreError::InvalidFormat("group command without group".into()))?;
        Ok(ID::parse(text)?)
    }

    pub fn members(&self) -> Vec<ID> {
        match self.dict.get("members").and_then(Value::as_array) {
            Some(members) => members
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|text| ID::parse(text).ok())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ReceiptCommand {
    pub(crate) dict: Dict,
}

impl ReceiptCommand {
    pub fn new(text: &str) -> Self {
        let mut dict = new_command_dict(command_name::RECEIPT);
        dict.insert("text".into(), Value::from(text));
        Self { dict }
    }

    /// Acknowledge a processed message, fingerprinting it by content serial
    /// and a signature prefix.
    pub fn from_message(text: &str, message: &ReliableMessage, content: &Content) -> Self {
        let mut receipt = Self::new(text);
        let mut origin = Dict::new();
        origin.insert("sn".into(), Value::from(content.sn()));
        if let Some(signature) = coder::get_str(message.as_dict(), "signature") {
            let prefix: String = signature.chars().take(8).collect();
            origin.insert("signature".into(), Value::from(prefix));
        }
        receipt.dict.insert("origin".into(), Value::Object(origin));
        receipt
    }

    pub fn text(&self) -> &str {
        coder::get_str(&self.dict, "text").unwrap_or_default()
    }

    pub fn origin(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "origin")
    }
}

/// Catch-all view for commands without a dedicated wrapper.
#[derive(Clone)]
pub struct BaseCommand {
    pub(crate) dict: Dict,
}

impl BaseCommand {
    pub fn new(name: &str) -> Self {
        Self {
            dict: new_command_dict(name),
        }
    }

    /// Login announcement for `identifier`.
    pub fn login(identifier: &ID) -> Self {
        let mut command = Self::new(command_name::LOGIN);
        command
            .dict
            .insert("ID".into(), Value::from(identifier.to_string()));
        command
    }

    /// Block or mute list update.
    pub fn id_list(name: &str, list: &[ID]) -> Self {
        let mut command = Self::new(name);
        let items: Vec<Value> = list
            .iter()
            .map(|identifier| Value::from(identifier.to_string()))
            .collect();
        command.dict.insert("list".into(), Value::from(items));
        command
    }

    pub fn name(&self) -> &str {
        coder::get_str(&self.dict, "command").unwrap_or_default()
    }

    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dim_mkm::Address;

    fn some_id() -> ID {
        ID::new(Some("moki"), Address::btc_from_data(b"moki", 0x08), None)
    }

    #[test]
    fn test_meta_command_roundtrip() {
        let id = some_id();
        let query = MetaCommand::query(&id);
        let parsed = Command::parse(query.dict.clone()).unwrap();
        match parsed {
            Command::Meta(command) => {
                assert_eq!(command.identifier().unwrap(), id);
                assert!(command.meta().is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_group_command_kinds() {
        let group = ID::everyone();
        let member = some_id();

        let invite = GroupCommand::invite(&group, &[member.clone()]);
        assert_eq!(invite.name(), command_name::INVITE);
        assert_eq!(invite.members(), vec![member]);
        assert_eq!(invite.group().unwrap(), group);
        assert_eq!(
            coder::get_u8(&invite.dict, "type").unwrap(),
            content_type::HISTORY
        );

        let query = GroupCommand::query(&group);
        assert_eq!(
            coder::get_u8(&query.dict, "type").unwrap(),
            content_type::COMMAND
        );
    }

    #[test]
    fn test_unknown_command_preserved() {
        let mut dict = new_command_dict("teleport");
        dict.insert("somewhere".into(), Value::from("else"));
        let parsed = Command::parse(dict.clone()).unwrap();
        match parsed {
            Command::Other(command) => {
                assert_eq!(command.name(), "teleport");
                assert_eq!(command.as_dict(), &dict);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_command_requires_name() {
        let dict = new_content_dict(content_type::COMMAND);
        assert!(Command::parse(dict).is_err());
    }
}
