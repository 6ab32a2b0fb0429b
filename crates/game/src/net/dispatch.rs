use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::protocol::{Message, MessageTag, WireError};
use super::transport::PeerId;

/// A subsystem interested in one or more message tags.
pub trait MessageHandler {
    fn handle(&mut self, tag: MessageTag, message: &Message, sender: PeerId);
}

impl<F> MessageHandler for F
where
    F: FnMut(MessageTag, &Message, PeerId),
{
    fn handle(&mut self, tag: MessageTag, message: &Message, sender: PeerId) {
        self(tag, message, sender)
    }
}

pub type HandlerRef = Rc<RefCell<dyn MessageHandler>>;

pub fn handler_ref<H: MessageHandler + 'static>(handler: H) -> HandlerRef {
    Rc::new(RefCell::new(handler))
}

/// Routes inbound messages to every handler registered for their tag.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageTag, Vec<HandlerRef>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, tag: MessageTag, handler: HandlerRef) {
        self.handlers.entry(tag).or_default().push(handler);
    }

    pub fn handler_count(&self, tag: MessageTag) -> usize {
        self.handlers.get(&tag).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Delivers `message` to its handlers in registration order.
    /// Returns false when nothing is registered for the tag.
    pub fn dispatch(&self, message: Message, sender: PeerId) -> bool {
        let tag = message.tag();
        let Some(handlers) = self.handlers.get(&tag).filter(|h| !h.is_empty()) else {
            log::warn!("No handler for {:?} from {}", tag, sender);
            return false;
        };

        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut handler) => handler.handle(tag, &message, sender),
                Err(_) => log::error!("Handler for {:?} is already running; skipped", tag),
            }
        }
        true
    }

    pub fn dispatch_bytes(&self, bytes: &[u8], sender: PeerId) -> Result<bool, WireError> {
        let message = Message::decode(bytes)?;
        Ok(self.dispatch(message, sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{AckMessage, AppMessage};

    #[test]
    fn test_handlers_run_in_registration_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();

        for name in ["first", "second"] {
            let calls = Rc::clone(&calls);
            dispatcher.register_handler(
                MessageTag::Ack,
                handler_ref(move |tag: MessageTag, _: &Message, sender: PeerId| {
                    calls.borrow_mut().push((name, tag, sender));
                }),
            );
        }

        let handled = dispatcher.dispatch(
            Message::Ack(AckMessage {
                entity_id: 1,
                version_id: 2,
            }),
            PeerId(3),
        );

        assert!(handled);
        assert_eq!(
            *calls.borrow(),
            vec![
                ("first", MessageTag::Ack, PeerId(3)),
                ("second", MessageTag::Ack, PeerId(3)),
            ]
        );
    }

    #[test]
    fn test_unregistered_tag_is_not_handled() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler(MessageTag::Ack, handler_ref(|_: MessageTag, _: &Message, _: PeerId| {}));

        let handled = dispatcher.dispatch(
            Message::App(AppMessage {
                tag: MessageTag::BuffSync,
                payload: vec![1],
            }),
            PeerId(1),
        );

        assert!(!handled);
        assert_eq!(dispatcher.handler_count(MessageTag::Ack), 1);
        assert_eq!(dispatcher.handler_count(MessageTag::BuffSync), 0);
    }

    #[test]
    fn test_app_messages_route_by_tag() {
        let seen = Rc::new(RefCell::new(None));
        let mut dispatcher = Dispatcher::new();
        {
            let seen = Rc::clone(&seen);
            dispatcher.register_handler(
                MessageTag::InventorySync,
                handler_ref(move |_: MessageTag, message: &Message, _: PeerId| {
                    if let Message::App(app) = message {
                        *seen.borrow_mut() = Some(app.payload.clone());
                    }
                }),
            );
        }

        let bytes = Message::App(AppMessage {
            tag: MessageTag::InventorySync,
            payload: vec![4, 5, 6],
        })
        .encode();

        assert_eq!(dispatcher.dispatch_bytes(&bytes, PeerId(2)), Ok(true));
        assert_eq!(*seen.borrow(), Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_dispatch_bytes_reports_malformed_input() {
        let dispatcher = Dispatcher::new();
        assert_eq!(
            dispatcher.dispatch_bytes(&[9], PeerId(1)),
            Err(WireError::Truncated { len: 1 })
        );
    }
}
