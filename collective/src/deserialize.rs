use std::io;

/// Wire deserialization for incoming messages.
///
/// The returned value may borrow from `buf`, which holds one full frame.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
