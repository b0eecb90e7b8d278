//! Units for entity commands: meta and document exchange, plus receipts.

use tracing::{debug, warn};

use dim_mkm::{Document, Meta};

use crate::command::{Command, DocumentCommand, MetaCommand};
use crate::content::Content;
use crate::message::ReliableMessage;
use crate::processor::{ContentProcessor, Processor};

use super::contents::receipt;

/// Meta query/update. Updates are verified against the identifier before
/// they are stored; queries answer from the archivist.
pub struct MetaUnit;

impl ContentProcessor for MetaUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let command = match content {
            Content::Command(Command::Meta(command)) => command,
            _ => return Vec::new(),
        };
        let identifier = match command.identifier() {
            Ok(identifier) => identifier,
            Err(error) => {
                warn!(%error, "meta command unreadable");
                return vec![receipt("Meta command error!", message, content)];
            }
        };
        let barrack = processor.barrack();
        match command.meta() {
            // update
            Some(dict) => {
                let accepted = Meta::parse(dict, barrack.registry())
                    .map(|meta| barrack.save_meta(&meta, &identifier))
                    .unwrap_or(false);
                let text = if accepted {
                    format!("Meta received: {identifier}")
                } else {
                    format!("Meta not accepted: {identifier}")
                };
                vec![receipt(&text, message, content)]
            }
            // query
            None => match barrack.meta(&identifier) {
                Some(meta) => {
                    vec![Content::Command(Command::Meta(MetaCommand::response(
                        &identifier,
                        &meta,
                    )))]
                }
                None => vec![receipt(
                    &format!("Meta not found: {identifier}"),
                    message,
                    content,
                )],
            },
        }
    }
}

/// Document query/update. An attached meta is stored first so the document
/// of a brand-new contact can verify.
pub struct DocumentUnit;

impl ContentProcessor for DocumentUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let command = match content {
            Content::Command(Command::Document(command)) => command,
            _ => return Vec::new(),
        };
        let identifier = match command.identifier() {
            Ok(identifier) => identifier,
            Err(error) => {
                warn!(%error, "document command unreadable");
                return vec![receipt("Document command error!", message, content)];
            }
        };
        let barrack = processor.barrack();
        if let Some(dict) = command.document() {
            if let Some(meta) = command.meta() {
                if let Some(meta) = Meta::parse(meta, barrack.registry()) {
                    barrack.save_meta(&meta, &identifier);
                }
            }
            let accepted = Document::parse(dict)
                .map(|document| barrack.save_document(&document))
                .unwrap_or(false);
            let text = if accepted {
                format!("Document received: {identifier}")
            } else {
                format!("Document not accepted: {identifier}")
            };
            return vec![receipt(&text, message, content)];
        }
        // query
        let document = match barrack.document(&identifier, None) {
            Some(document) => document,
            None => {
                return vec![receipt(
                    &format!("Document not found: {identifier}"),
                    message,
                    content,
                )]
            }
        };
        if let (Some(last_time), Some(time)) = (command.last_time(), document.time()) {
            if time <= last_time {
                return vec![receipt(
                    &format!("Document not changed: {identifier}"),
                    message,
                    content,
                )];
            }
        }
        let meta = barrack.meta(&identifier);
        vec![Content::Command(Command::Document(
            DocumentCommand::response(&identifier, meta.as_ref(), &document),
        ))]
    }
}

/// Receipts terminate here: acknowledging an acknowledgement would loop.
pub struct ReceiptUnit;

impl ContentProcessor for ReceiptUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        _processor: &Processor,
    ) -> Vec<Content> {
        if let Content::Command(Command::Receipt(command)) = content {
            debug!(
                sender = %message.sender(),
                text = command.text(),
                "receipt"
            );
        }
        Vec::new()
    }
}
