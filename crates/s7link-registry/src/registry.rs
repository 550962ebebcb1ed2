use std::collections::hash_map::Entry;
use std::collections::HashMap;

use s7link_frame::{Message, INVALID_TYPE_ID};
use tracing::{debug, warn};

use crate::descriptor::MessageDescriptor;
use crate::error::{ConfigError, Result};
use crate::handler::MessageHandler;

/// Type-id-keyed table of message descriptors.
///
/// Built once; lookups never fail.
#[derive(Debug)]
pub struct MessageRegistry {
    descriptors: HashMap<i32, MessageDescriptor>,
    fallback: MessageDescriptor,
}

impl MessageRegistry {
    /// A registry where every type id resolves to the fallback.
    pub fn empty() -> Self {
        Self {
            descriptors: HashMap::new(),
            fallback: MessageDescriptor::notify(INVALID_TYPE_ID),
        }
    }

    /// Build from descriptors, failing on the first reused type id.
    ///
    /// A descriptor for the invalid type id 0 is kept: it then handles
    /// frames whose type id did not parse. Such messages are never sent.
    pub fn build(descriptors: impl IntoIterator<Item = MessageDescriptor>) -> Result<Self> {
        let mut registry = Self::empty();

        for descriptor in descriptors {
            let type_id = descriptor.type_id();
            if type_id == INVALID_TYPE_ID {
                warn!(type_id, "descriptor registered for the invalid type id");
            }
            match registry.descriptors.entry(type_id) {
                Entry::Occupied(_) => return Err(ConfigError::DuplicateTypeId { type_id }),
                Entry::Vacant(slot) => {
                    slot.insert(descriptor);
                }
            }
        }

        debug!(kinds = registry.descriptors.len(), "message registry built");
        Ok(registry)
    }

    /// Descriptor for `type_id`, or the notify-only fallback.
    pub fn lookup(&self, type_id: i32) -> &MessageDescriptor {
        self.descriptors.get(&type_id).unwrap_or(&self.fallback)
    }

    /// Build the handler for a decoded message.
    pub fn instantiate(&self, message: Message) -> Box<dyn MessageHandler> {
        self.lookup(message.type_id).instantiate(message)
    }

    pub fn is_registered(&self, type_id: i32) -> bool {
        self.descriptors.contains_key(&type_id)
    }

    /// Registered type ids, ascending.
    pub fn type_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::empty()
    }
}
