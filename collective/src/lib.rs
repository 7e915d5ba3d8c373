mod align;
mod deserialize;
mod error;
mod group;
pub mod msg;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::{Align1, Align4};
pub use deserialize::Deserialize;
pub use error::CollectiveErr;
pub use group::{ProcessGroup, RendezvousConfig};
pub use receiver::LinkReceiver;
pub use sender::LinkSender;
pub use serialize::Serialize;

/// The collective module's result type.
pub type Result<T> = std::result::Result<T, CollectiveErr>;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Creates both `LinkReceiver` and `LinkSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication link in the form of a receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (LinkReceiver<R>, LinkSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (LinkReceiver::new(rx), LinkSender::new(tx))
}
