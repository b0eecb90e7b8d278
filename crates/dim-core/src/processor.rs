//! Content dispatch.
//!
//! A received reliable message is verified, decrypted and routed to a
//! content-processing unit: command contents dispatch on the command name,
//! everything else on the content type byte. Units return response contents
//! that the messenger sends back to the original sender. Unknown contents
//! and commands get a polite receipt instead of silence.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use dim_mkm::ID;

use crate::barrack::Barrack;
use crate::command::{command_name, Command, ReceiptCommand};
use crate::content::{content_type, Content};
use crate::cpu;
use crate::error::CoreError;
use crate::message::ReliableMessage;
use crate::transceiver::Transceiver;

/// A content-processing unit. Units are stateless; recursion (forwarded
/// messages, content arrays) goes back through the processor handle.
pub trait ContentProcessor: Send + Sync {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content>;
}

pub struct Processor {
    barrack: Arc<Barrack>,
    transceiver: Arc<Transceiver>,
    content_units: HashMap<u8, Arc<dyn ContentProcessor>>,
    command_units: HashMap<String, Arc<dyn ContentProcessor>>,
}

impl Processor {
    /// A processor with the built-in units registered.
    pub fn new(barrack: Arc<Barrack>, transceiver: Arc<Transceiver>) -> Self {
        let mut processor = Self {
            barrack,
            transceiver,
            content_units: HashMap::new(),
            command_units: HashMap::new(),
        };
        processor.register_content_unit(content_type::FORWARD, Arc::new(cpu::ForwardUnit));
        processor.register_content_unit(content_type::ARRAY, Arc::new(cpu::ArrayUnit));
        processor.register_content_unit(content_type::CUSTOMIZED, Arc::new(cpu::CustomizedUnit::new()));
        for ty in [
            content_type::FILE,
            content_type::IMAGE,
            content_type::AUDIO,
            content_type::VIDEO,
        ] {
            processor.register_content_unit(ty, Arc::new(cpu::FileUnit));
        }
        processor.register_command_unit(command_name::META, Arc::new(cpu::MetaUnit));
        processor.register_command_unit(command_name::DOCUMENT, Arc::new(cpu::DocumentUnit));
        processor.register_command_unit(command_name::RECEIPT, Arc::new(cpu::ReceiptUnit));
        for name in [
            command_name::INVITE,
            command_name::EXPEL,
            command_name::QUIT,
            command_name::RESET,
            command_name::QUERY,
        ] {
            processor.register_command_unit(name, Arc::new(cpu::GroupUnit));
        }
        processor
    }

    /// Override or extend dispatch for a content type.
    pub fn register_content_unit(&mut self, ty: u8, unit: Arc<dyn ContentProcessor>) {
        self.content_units.insert(ty, unit);
    }

    /// Override or extend dispatch for a command name.
    pub fn register_command_unit(&mut self, name: &str, unit: Arc<dyn ContentProcessor>) {
        self.command_units.insert(name.to_owned(), unit);
    }

    pub fn barrack(&self) -> &Arc<Barrack> {
        &self.barrack
    }

    pub fn transceiver(&self) -> &Arc<Transceiver> {
        &self.transceiver
    }

    /// Full receive transform for one message: verify, decrypt as the
    /// addressed local user, then dispatch the content.
    pub fn process_reliable(&self, message: &ReliableMessage) -> Result<Vec<Content>, CoreError> {
        let secure = self.transceiver.verify_message(message)?;
        let user = self.select_local_user(&secure).ok_or_else(|| {
            CoreError::Unauthorized(format!(
                "message for {} reached the wrong client",
                secure.receiver()
            ))
        })?;
        let instant = self.transceiver.decrypt_message(&secure, &user)?;
        Ok(self.process_content(instant.content(), message))
    }

    /// Route one decrypted content to its unit.
    pub fn process_content(&self, content: &Content, message: &ReliableMessage) -> Vec<Content> {
        match content {
            Content::Command(command) | Content::History(command) => {
                match self.command_units.get(command.name()) {
                    Some(unit) => unit.process(content, message, self),
                    None => {
                        debug!(name = command.name(), "unhandled command");
                        vec![unsupported_command(command, message, content)]
                    }
                }
            }
            _ => match self.content_units.get(&content.content_type()) {
                Some(unit) => unit.process(content, message, self),
                None => {
                    debug!(ty = content.content_type(), "unhandled content type");
                    vec![Content::Command(Command::Receipt(
                        ReceiptCommand::from_message(
                            &format!(
                                "Content (type: {}) not support yet!",
                                content.content_type()
                            ),
                            message,
                            content,
                        ),
                    ))]
                }
            },
        }
    }

    /// The local user this message is addressed to: the receiver for 1:1,
    /// the member holding a wrapped key for groups, anyone for broadcast.
    pub(crate) fn select_local_user(&self, message: &crate::message::SecureMessage) -> Option<ID> {
        let receiver = message.receiver();
        let locals = self.barrack.local_users();
        if receiver.is_broadcast() {
            return locals.into_iter().next();
        }
        if receiver.is_group() {
            if let Some(member) = locals
                .iter()
                .find(|user| message.wrapped_key_for(user).is_some())
            {
                return Some(member.clone());
            }
            return None;
        }
        locals.into_iter().find(|user| user == receiver)
    }
}

fn unsupported_command(
    command: &Command,
    message: &ReliableMessage,
    content: &Content,
) -> Content {
    Content::Command(Command::Receipt(ReceiptCommand::from_message(
        &format!("Command (name: {}) not support yet!", command.name()),
        message,
        content,
    )))
}
