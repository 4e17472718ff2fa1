/*!
Stable identifiers for saveable participants.

An id is generated once, stored alongside the owning object and reused on every later
save and load. These helpers fill in an id only when the caller does not have one yet.
*/

use uuid::Uuid;

/// Generate a fresh random identifier
pub fn new_guid() -> Uuid {
    Uuid::new_v4()
}

/// Fill `id` with a new identifier if it is nil, and return the (possibly new) value.
///
/// # Example
/// ```rust
/// use keepsake_core::identity::ensure_guid;
/// use keepsake_core::Uuid;
///
/// let mut id = Uuid::nil();
/// let first = ensure_guid(&mut id);
/// assert!(!first.is_nil());
/// assert_eq!(ensure_guid(&mut id), first);
/// ```
pub fn ensure_guid(id: &mut Uuid) -> Uuid {
    if id.is_nil() {
        *id = new_guid();
    }
    *id
}

/// Same as [`ensure_guid`] for an id kept as raw bytes
pub fn ensure_guid_bytes(id: &mut [u8; 16]) -> [u8; 16] {
    if id.iter().all(|b| *b == 0) {
        *id = *new_guid().as_bytes();
    }
    *id
}

/// Ensure a string participant id is usable.
///
/// Blank ids are replaced by a new hyphenated UUID, ids that parse as a UUID are
/// normalized to lowercase hyphenated form, anything else is kept as-is.
pub fn ensure_id(id: &mut String) -> &str {
    if id.trim().is_empty() {
        *id = new_guid().hyphenated().to_string();
    } else if let Ok(parsed) = Uuid::parse_str(id.trim()) {
        *id = parsed.hyphenated().to_string();
    }
    id.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_guid_is_replaced_once() {
        let mut id = Uuid::nil();
        let generated = ensure_guid(&mut id);
        assert!(!generated.is_nil());
        assert_eq!(id, generated);
        assert_eq!(ensure_guid(&mut id), generated);
    }

    #[test]
    fn test_existing_guid_is_kept() {
        let original = new_guid();
        let mut id = original;
        assert_eq!(ensure_guid(&mut id), original);
    }

    #[test]
    fn test_zero_bytes_are_replaced() {
        let mut raw = [0u8; 16];
        let generated = ensure_guid_bytes(&mut raw);
        assert_ne!(generated, [0u8; 16]);
        assert_eq!(raw, generated);

        let mut set = [7u8; 16];
        assert_eq!(ensure_guid_bytes(&mut set), [7u8; 16]);
    }

    #[test]
    fn test_blank_string_id_gets_uuid() {
        let mut id = "  ".to_string();
        let value = ensure_id(&mut id).to_string();
        assert!(Uuid::parse_str(&value).is_ok());
    }

    #[test]
    fn test_uuid_string_is_normalized() {
        let mut id = "  67E55044-10B1-426F-9247-BB680E5FE0C8 ".to_string();
        assert_eq!(ensure_id(&mut id), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn test_custom_string_id_is_untouched() {
        let mut id = "player".to_string();
        assert_eq!(ensure_id(&mut id), "player");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<Uuid> = (0..256).map(|_| new_guid()).collect();
        assert_eq!(ids.len(), 256);
    }
}
