/// Wire serialization for outgoing messages.
///
/// Implementations append their header bytes to `buf` and may return a
/// borrowed payload slice to be written after it without copying.
pub trait Serialize<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
