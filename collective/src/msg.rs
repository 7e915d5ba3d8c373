use std::{borrow::Cow, io};

use half::f16;

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// Gradients travel fp16-compressed in both directions; metric counts and
/// weight snapshots stay f32.
#[derive(Debug)]
pub enum Payload<'a> {
    GradFp16(&'a [f16]),
    Metric(&'a [f32]),
    Weights(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Join { rank: usize },
    Ready,
    Disconnect,
}

/// The application layer message for the process group.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: u8) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }

    /// Short tag used in protocol-violation errors and warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join { .. }) => "control/join",
            Msg::Control(Command::Ready) => "control/ready",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::GradFp16(_)) => "data/grad",
            Msg::Data(Payload::Metric(_)) => "data/metric",
            Msg::Data(Payload::Weights(_)) => "data/weights",
            Msg::Err(_) => "err",
        }
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = (0 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                let header = (1 as Header).to_be_bytes();
                buf.extend_from_slice(&header);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, bytes): (Header, &[u8]) = match payload {
                    Payload::GradFp16(grad) => (2, bytemuck::cast_slice(grad)),
                    Payload::Metric(counts) => (3, bytemuck::cast_slice(counts)),
                    Payload::Weights(weights) => (4, bytemuck::cast_slice(weights)),
                };

                let header = kind.to_be_bytes();
                buf.extend_from_slice(&header);
                Some(bytes)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap()) as u8;

        match kind {
            0 => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => Ok(Self::Data(Payload::GradFp16(bytemuck::cast_slice(rest)))),
            3 => Ok(Self::Data(Payload::Metric(bytemuck::cast_slice(rest)))),
            4 => Ok(Self::Data(Payload::Weights(bytemuck::cast_slice(rest)))),
            byte => Self::invalid_kind_byte(byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Msg<'_>) -> Vec<u8> {
        let mut buf = Vec::new();
        let tail = msg.serialize(&mut buf);
        if let Some(tail) = tail {
            buf.extend_from_slice(tail);
        }
        buf
    }

    #[test]
    fn control_commands_survive_the_wire() {
        let mut bytes = round_trip(&Msg::Control(Command::Join { rank: 3 }));
        match Msg::deserialize(&mut bytes).unwrap() {
            Msg::Control(Command::Join { rank }) => assert_eq!(rank, 3),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn grad_payload_keeps_fp16_values() {
        let grad: Vec<f16> = [1.0f32, -0.5, 0.25]
            .iter()
            .map(|&v| f16::from_f32(v))
            .collect();

        let mut bytes = round_trip(&Msg::Data(Payload::GradFp16(&grad)));
        match Msg::deserialize(&mut bytes).unwrap() {
            Msg::Data(Payload::GradFp16(got)) => assert_eq!(got, grad.as_slice()),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn metric_payload_is_raw_f32() {
        let counts = [12.0f32, 32.0];
        let mut bytes = round_trip(&Msg::Data(Payload::Metric(&counts)));
        match Msg::deserialize(&mut bytes).unwrap() {
            Msg::Data(Payload::Metric(got)) => assert_eq!(got, counts.as_slice()),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = 9u32.to_be_bytes().to_vec();
        assert!(Msg::deserialize(&mut bytes).is_err());
    }
}
