use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use relay_protocol::Contact;

/// Contacts learned from inbound Bale updates, in first-seen order. Entries
/// are replaced on every sighting and never removed.
#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    entries: Arc<RwLock<IndexMap<String, Contact>>>,
}

impl ContactDirectory {
    /// Inserts or replaces the entry for `contact.id`. Returns whether the
    /// contact was new.
    pub fn upsert(&self, contact: Contact) -> bool {
        self.entries
            .write()
            .insert(contact.id.clone(), contact)
            .is_none()
    }

    pub fn list(&self) -> Vec<Contact> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_in_place() {
        let directory = ContactDirectory::default();
        assert!(directory.upsert(Contact::new("1", Some("Sara".into()), None)));
        assert!(directory.upsert(Contact::new("2", None, Some("reza".into()))));
        assert!(!directory.upsert(Contact::new("1", Some("Sara A.".into()), Some("sara".into()))));

        let listed = directory.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "1");
        assert_eq!(listed[0].name, "Sara A.");
        assert_eq!(listed[0].username.as_deref(), Some("sara"));
        assert_eq!(listed[1].name, "reza");
        assert_eq!(listed[1].id, "2");
        assert_eq!(directory.len(), 2);
    }
}
