//! Units for structural contents: forwarded messages, arrays, files and
//! application-customized payloads.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::{Command, ReceiptCommand};
use crate::content::{Content, CustomizedContent};
use crate::message::ReliableMessage;
use crate::processor::{ContentProcessor, Processor};

/// Re-injects a wrapped reliable message into the receive pipeline.
pub struct ForwardUnit;

impl ContentProcessor for ForwardUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let forward = match content {
            Content::Forward(forward) => forward,
            _ => return Vec::new(),
        };
        let nested = match forward.forward() {
            Ok(nested) => nested,
            Err(error) => {
                warn!(%error, "forward content unreadable");
                return vec![receipt("Forward message error!", message, content)];
            }
        };
        match processor.process_reliable(&nested) {
            Ok(_) => {
                debug!(sender = %nested.sender(), "forwarded message processed");
                vec![receipt("Message forwarded!", message, content)]
            }
            Err(error) => {
                // resolution failures for the inner sender are not ours to
                // retry here; the host parks the outer message if it cares
                warn!(%error, "forwarded message failed");
                vec![receipt("Forward message failed!", message, content)]
            }
        }
    }
}

/// Processes each element of a content array in order.
pub struct ArrayUnit;

impl ContentProcessor for ArrayUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let array = match content {
            Content::Array(array) => array,
            _ => return Vec::new(),
        };
        array
            .contents()
            .iter()
            .flat_map(|item| processor.process_content(item, message))
            .collect()
    }
}

/// File/image/audio/video attachments. The core only checks the content is
/// fetchable; rendering and download are the application's business.
pub struct FileUnit;

impl ContentProcessor for FileUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        _processor: &Processor,
    ) -> Vec<Content> {
        let file = match content {
            Content::File(file) => file,
            _ => return Vec::new(),
        };
        if file.data().is_none() && file.url().is_none() {
            return vec![receipt("File content error: no data or URL", message, content)];
        }
        Vec::new()
    }
}

/// Handler for one application's customized contents.
pub trait CustomizedHandler: Send + Sync {
    fn handle(
        &self,
        content: &CustomizedContent,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content>;
}

/// Application-defined contents, dispatched by `(app, mod)`; without a
/// handler registered for the pair the core can only acknowledge.
#[derive(Default)]
pub struct CustomizedUnit {
    handlers: HashMap<(String, String), Arc<dyn CustomizedHandler>>,
}

impl CustomizedUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route contents carrying this `(app, mod)` pair to `handler`.
    pub fn register(&mut self, app: &str, module: &str, handler: Arc<dyn CustomizedHandler>) {
        self.handlers
            .insert((app.to_owned(), module.to_owned()), handler);
    }
}

impl ContentProcessor for CustomizedUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let custom = match content {
            Content::Customized(custom) => custom,
            _ => return Vec::new(),
        };
        let route = (custom.app().to_owned(), custom.module().to_owned());
        if let Some(handler) = self.handlers.get(&route) {
            return handler.handle(custom, message, processor);
        }
        debug!(
            app = custom.app(),
            module = custom.module(),
            action = custom.action(),
            "customized content without a handler"
        );
        vec![receipt(
            &format!(
                "Customized content (app: {}, mod: {}) not support yet!",
                custom.app(),
                custom.module()
            ),
            message,
            content,
        )]
    }
}

pub(super) fn receipt(text: &str, message: &ReliableMessage, content: &Content) -> Content {
    Content::Command(Command::Receipt(ReceiptCommand::from_message(
        text, message, content,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::content::ArrayContent;
    use crate::message::{Envelope, InstantMessage};
    use crate::testutil::{facility, rsa_user};
    use crate::transceiver::Transceiver;

    #[test]
    fn test_array_flattens_responses() {
        let moki = rsa_user("moki");
        let hulk = rsa_user("hulk");
        let (moki_id, hulk_id) = (moki.0.clone(), hulk.0.clone());
        let moki_meta = moki.2.clone();

        let sender = facility(vec![moki], vec![(hulk_id.clone(), hulk.2.clone())]);
        let tx = Transceiver::new(sender.barrack, sender.keystore);
        let batch = Content::Array(ArrayContent::new(&[
            Content::text("one"),
            Content::text("two"),
        ]));
        let message = InstantMessage::new(Envelope::new(moki_id.clone(), hulk_id.clone()), batch);
        let reliable = tx
            .sign_message(&tx.encrypt_message(&message).unwrap())
            .unwrap();

        let side = facility(vec![hulk], vec![(moki_id, moki_meta)]);
        let rx = Arc::new(Transceiver::new(side.barrack.clone(), side.keystore));
        let processor = Processor::new(side.barrack, rx);

        // two text items, two unsupported-content receipts
        let responses = processor.process_reliable(&reliable).unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn test_customized_dispatches_by_app_and_module() {
        struct DiceHandler;
        impl CustomizedHandler for DiceHandler {
            fn handle(
                &self,
                content: &CustomizedContent,
                _message: &ReliableMessage,
                _processor: &Processor,
            ) -> Vec<Content> {
                assert_eq!(content.action(), "throw");
                vec![Content::text("dice thrown")]
            }
        }

        let moki = rsa_user("moki");
        let hulk = rsa_user("hulk");
        let (moki_id, hulk_id) = (moki.0.clone(), hulk.0.clone());
        let moki_meta = moki.2.clone();

        let sender = facility(vec![moki], vec![(hulk_id.clone(), hulk.2.clone())]);
        let tx = Transceiver::new(sender.barrack, sender.keystore);
        let pack = |content: Content| {
            let message =
                InstantMessage::new(Envelope::new(moki_id.clone(), hulk_id.clone()), content);
            tx.sign_message(&tx.encrypt_message(&message).unwrap())
                .unwrap()
        };
        let game_move = pack(Content::Customized(CustomizedContent::new(
            "chat.game", "dice", "throw",
        )));
        let other_app = pack(Content::Customized(CustomizedContent::new(
            "chat.poll", "vote", "cast",
        )));

        let side = facility(vec![hulk], vec![(moki_id, moki_meta)]);
        let rx = Arc::new(Transceiver::new(side.barrack.clone(), side.keystore));
        let mut processor = Processor::new(side.barrack, rx);
        let mut unit = CustomizedUnit::new();
        unit.register("chat.game", "dice", Arc::new(DiceHandler));
        processor
            .register_content_unit(crate::content::content_type::CUSTOMIZED, Arc::new(unit));

        let responses = processor.process_reliable(&game_move).unwrap();
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            Content::Text(text) => assert_eq!(text.text(), "dice thrown"),
            _ => panic!("expected the handler response"),
        }

        // an unregistered pair still falls back to a receipt
        let responses = processor.process_reliable(&other_app).unwrap();
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            Content::Command(Command::Receipt(r)) => {
                assert!(r.text().contains("chat.poll"));
            }
            _ => panic!("expected a receipt"),
        }
    }

    #[test]
    fn test_forward_reinjects() {
        let moki = rsa_user("moki");
        let hulk = rsa_user("hulk");
        let loki = rsa_user("loki");
        let (moki_id, hulk_id, loki_id) = (moki.0.clone(), hulk.0.clone(), loki.0.clone());
        let (moki_meta, loki_meta) = (moki.2.clone(), loki.2.clone());

        // loki writes to hulk, but routes the message through moki
        let loki_side = facility(vec![loki], vec![(hulk_id.clone(), hulk.2.clone())]);
        let loki_tx = Transceiver::new(loki_side.barrack, loki_side.keystore);
        let inner = loki_tx
            .sign_message(
                &loki_tx
                    .encrypt_message(&InstantMessage::new(
                        Envelope::new(loki_id.clone(), hulk_id.clone()),
                        Content::text("psst"),
                    ))
                    .unwrap(),
            )
            .unwrap();

        let moki_side = facility(vec![moki], vec![(hulk_id.clone(), hulk.2.clone())]);
        let moki_tx = Transceiver::new(moki_side.barrack, moki_side.keystore);
        let outer = moki_tx
            .sign_message(
                &moki_tx
                    .encrypt_message(&InstantMessage::new(
                        Envelope::new(moki_id.clone(), hulk_id.clone()),
                        Content::Forward(crate::content::ForwardContent::new(&inner)),
                    ))
                    .unwrap(),
            )
            .unwrap();

        let hulk_side = facility(
            vec![hulk],
            vec![(moki_id, moki_meta), (loki_id, loki_meta)],
        );
        let rx = Arc::new(Transceiver::new(hulk_side.barrack.clone(), hulk_side.keystore));
        let processor = Processor::new(hulk_side.barrack, rx);

        let responses = processor.process_reliable(&outer).unwrap();
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            Content::Command(Command::Receipt(r)) => {
                assert_eq!(r.text(), "Message forwarded!")
            }
            _ => panic!("expected a receipt"),
        }
    }
}
