//! Fixed-size process group with hub-at-rank-0 blocking collectives.
//!
//! Every rank must enter the collectives in the same order; there is no
//! timeout or partial-quorum handling once the group is up.

use std::time::Duration;

use half::f16;
use log::{debug, info, warn};
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Runtime,
    time,
};

use crate::{
    CollectiveErr, LinkReceiver, LinkSender, Result, channel,
    msg::{Command, Msg, Payload},
};

type NetRx = LinkReceiver<OwnedReadHalf>;
type NetTx = LinkSender<OwnedWriteHalf>;

const CONNECT_RETRY: Duration = Duration::from_millis(250);
const CONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Explicit rendezvous addressing, threaded into `bootstrap` instead of
/// living in process environment variables.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    pub master_addr: String,
    pub master_port: u16,
    pub world_size: usize,
    pub rank: usize,
}

impl RendezvousConfig {
    fn master_endpoint(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }
}

enum Links {
    /// Degenerate single-process group; every collective is a local no-op.
    Single,
    /// Coordinator side: one link per non-zero rank, ascending rank order.
    Hub(Vec<(usize, NetRx, NetTx)>),
    /// Non-coordinator side: the single link to rank 0.
    Spoke(NetRx, NetTx),
}

/// A joined fixed-size collective-communication group.
///
/// Owns its own tokio runtime and exposes blocking collectives, so the
/// training loop stays synchronous. One instance per process.
pub struct ProcessGroup {
    rank: usize,
    world_size: usize,
    runtime: Runtime,
    links: Links,
    // Persistent buffers reused across collectives to avoid per-step
    // allocations.
    recv_buf: Vec<u32>,
    f16_buf: Vec<f16>,
}

impl ProcessGroup {
    /// Joins the rendezvous group described by `cfg`.
    ///
    /// Rank 0 binds the master endpoint and accepts `world_size - 1` joins,
    /// then releases every rank with `Ready`. Other ranks connect (retrying
    /// up to a bounded deadline, since rank 0 may bind later) and wait for
    /// `Ready`.
    ///
    /// # Errors
    /// Returns `CollectiveErr::Rendezvous` when the group cannot form, and
    /// I/O or protocol errors for transport-level failures.
    pub fn bootstrap(cfg: &RendezvousConfig) -> Result<Self> {
        if cfg.world_size == 0 {
            return Err(CollectiveErr::Rendezvous {
                detail: "world size must be at least 1".to_string(),
            });
        }

        if cfg.rank >= cfg.world_size {
            return Err(CollectiveErr::Rendezvous {
                detail: format!(
                    "rank {} out of range for world size {}",
                    cfg.rank, cfg.world_size
                ),
            });
        }

        let runtime = Runtime::new().map_err(CollectiveErr::Io)?;

        let links = if cfg.world_size == 1 {
            Links::Single
        } else if cfg.rank == 0 {
            runtime.block_on(bootstrap_hub(cfg))?
        } else {
            runtime.block_on(bootstrap_spoke(cfg))?
        };

        info!(
            "joined process group: rank={} world_size={}",
            cfg.rank, cfg.world_size
        );

        Ok(Self {
            rank: cfg.rank,
            world_size: cfg.world_size,
            runtime,
            links,
            recv_buf: Vec::new(),
            f16_buf: Vec::new(),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Whether this process is the globally-designated coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }

    /// Element-wise sum of `values` across all ranks.
    ///
    /// On return every rank holds bit-identical summed values. Used for
    /// metric-count reduction, which must sum raw counts rather than
    /// average ratios.
    ///
    /// # Errors
    /// I/O or protocol errors; a peer payload of the wrong length is a
    /// `LengthMismatch`.
    pub fn all_reduce_sum(&mut self, values: &mut [f32]) -> Result<()> {
        let Self {
            runtime,
            links,
            recv_buf,
            ..
        } = self;

        match links {
            Links::Single => Ok(()),
            Links::Spoke(rx, tx) => runtime.block_on(async {
                tx.send(&Msg::Data(Payload::Metric(values))).await?;
                let reduced = recv_metric(rx, recv_buf, values.len()).await?;
                values.copy_from_slice(reduced);
                Ok(())
            }),
            Links::Hub(peers) => runtime.block_on(async {
                for (_, rx, _) in peers.iter_mut() {
                    let part = recv_metric(rx, recv_buf, values.len()).await?;
                    for (v, p) in values.iter_mut().zip(part) {
                        *v += *p;
                    }
                }

                for (_, _, tx) in peers.iter_mut() {
                    tx.send(&Msg::Data(Payload::Metric(values))).await?;
                }

                Ok(())
            }),
        }
    }

    /// Averages `grads` across all ranks with fp16 compression on the wire
    /// in both directions.
    ///
    /// Every contribution passes through fp16 (including the local one, so
    /// a single-process run matches multi-rank numerics), the reduction
    /// itself runs in f32 at rank 0, and the averaged result is compressed
    /// once and decompressed identically on every rank. Replicas therefore
    /// stay bit-identical after each step.
    ///
    /// # Errors
    /// I/O or protocol errors; a peer payload of the wrong length is a
    /// `LengthMismatch`.
    pub fn all_reduce_grad(&mut self, grads: &mut [f32]) -> Result<()> {
        let Self {
            runtime,
            links,
            recv_buf,
            f16_buf,
            world_size,
            ..
        } = self;

        compress(grads, f16_buf);

        match links {
            Links::Single => {
                decompress(f16_buf, grads);
                Ok(())
            }
            Links::Spoke(rx, tx) => runtime.block_on(async {
                tx.send(&Msg::Data(Payload::GradFp16(f16_buf))).await?;
                let reduced = recv_grad(rx, recv_buf, grads.len()).await?;

                for (g, r) in grads.iter_mut().zip(reduced) {
                    *g = r.to_f32();
                }

                Ok(())
            }),
            Links::Hub(peers) => runtime.block_on(async {
                // Local contribution goes through the same fp16 path as
                // everyone else's.
                decompress(f16_buf, grads);

                for (_, rx, _) in peers.iter_mut() {
                    let part = recv_grad(rx, recv_buf, grads.len()).await?;
                    for (g, p) in grads.iter_mut().zip(part) {
                        *g += p.to_f32();
                    }
                }

                let scale = 1.0 / *world_size as f32;
                for g in grads.iter_mut() {
                    *g *= scale;
                }

                compress(grads, f16_buf);

                for (_, _, tx) in peers.iter_mut() {
                    tx.send(&Msg::Data(Payload::GradFp16(f16_buf))).await?;
                }

                decompress(f16_buf, grads);
                Ok(())
            }),
        }
    }

    /// Broadcasts `values` from rank 0 to every rank.
    ///
    /// Used once at startup so all model replicas begin from identical
    /// parameters.
    ///
    /// # Errors
    /// I/O or protocol errors; a payload of the wrong length is a
    /// `LengthMismatch`.
    pub fn broadcast(&mut self, values: &mut [f32]) -> Result<()> {
        let Self {
            runtime,
            links,
            recv_buf,
            ..
        } = self;

        match links {
            Links::Single => Ok(()),
            Links::Hub(peers) => runtime.block_on(async {
                for (_, _, tx) in peers.iter_mut() {
                    tx.send(&Msg::Data(Payload::Weights(values))).await?;
                }
                Ok(())
            }),
            Links::Spoke(rx, _) => runtime.block_on(async {
                let msg = rx.recv_into::<Msg, _>(recv_buf).await?;
                match msg {
                    Msg::Data(Payload::Weights(w)) => {
                        expect_len("broadcast", w.len(), values.len())?;
                        values.copy_from_slice(w);
                        Ok(())
                    }
                    other => Err(unexpected("broadcast", &other)),
                }
            }),
        }
    }

    /// Releases the group with a disconnect handshake.
    ///
    /// Must be entered by every rank, once, after the last collective.
    /// Socket resources are also released on drop, so an error path that
    /// never reaches this call still frees the local side.
    ///
    /// # Errors
    /// I/O or protocol errors during the handshake.
    pub fn shutdown(self) -> Result<()> {
        let Self {
            rank,
            runtime,
            links,
            mut recv_buf,
            ..
        } = self;

        match links {
            Links::Single => {}
            Links::Spoke(mut rx, mut tx) => runtime.block_on(async {
                tx.send(&Msg::Control(Command::Disconnect)).await?;

                while !matches!(
                    rx.recv_into::<Msg, _>(&mut recv_buf).await?,
                    Msg::Control(Command::Disconnect)
                ) {}

                Ok::<_, CollectiveErr>(())
            })?,
            Links::Hub(peers) => runtime.block_on(async {
                for (peer, mut rx, mut tx) in peers {
                    while !matches!(
                        rx.recv_into::<Msg, _>(&mut recv_buf).await?,
                        Msg::Control(Command::Disconnect)
                    ) {}

                    tx.send(&Msg::Control(Command::Disconnect)).await?;
                    debug!(peer = peer; "peer released");
                }

                Ok::<_, CollectiveErr>(())
            })?,
        }

        info!("process group released: rank={rank}");
        Ok(())
    }
}

async fn bootstrap_hub(cfg: &RendezvousConfig) -> Result<Links> {
    let listener = TcpListener::bind(cfg.master_endpoint())
        .await
        .map_err(|e| CollectiveErr::Rendezvous {
            detail: format!("failed to bind {}: {e}", cfg.master_endpoint()),
        })?;

    let mut slots: Vec<Option<(NetRx, NetTx)>> = Vec::new();
    slots.resize_with(cfg.world_size, || None);

    let mut joined = 0;
    let mut buf: Vec<u32> = Vec::new();

    while joined < cfg.world_size - 1 {
        let (stream, addr) = listener.accept().await.map_err(CollectiveErr::Io)?;
        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = channel(rx, tx);

        let rank = match rx.recv_into::<Msg, _>(&mut buf).await? {
            Msg::Control(Command::Join { rank }) => rank,
            other => return Err(unexpected("rendezvous", &other)),
        };

        if rank == 0 || rank >= cfg.world_size {
            return Err(CollectiveErr::Rendezvous {
                detail: format!("peer {addr} joined with invalid rank {rank}"),
            });
        }

        if slots[rank].is_some() {
            return Err(CollectiveErr::Rendezvous {
                detail: format!("duplicate join for rank {rank} from {addr}"),
            });
        }

        debug!(rank = rank; "peer joined from {addr}");
        slots[rank] = Some((rx, tx));
        joined += 1;
    }

    let mut peers = Vec::with_capacity(cfg.world_size - 1);
    for (rank, slot) in slots.into_iter().enumerate() {
        if let Some((rx, mut tx)) = slot {
            tx.send(&Msg::Control(Command::Ready)).await?;
            peers.push((rank, rx, tx));
        }
    }

    Ok(Links::Hub(peers))
}

async fn bootstrap_spoke(cfg: &RendezvousConfig) -> Result<Links> {
    let endpoint = cfg.master_endpoint();
    let deadline = time::Instant::now() + CONNECT_DEADLINE;

    // Rank 0 may bind after we start; retry until the deadline.
    let stream = loop {
        match TcpStream::connect(&endpoint).await {
            Ok(stream) => break stream,
            Err(e) if time::Instant::now() < deadline => {
                warn!("master {endpoint} not reachable yet: {e}");
                time::sleep(CONNECT_RETRY).await;
            }
            Err(e) => {
                return Err(CollectiveErr::Rendezvous {
                    detail: format!("could not reach master {endpoint}: {e}"),
                });
            }
        }
    };

    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = channel(rx, tx);

    tx.send(&Msg::Control(Command::Join { rank: cfg.rank })).await?;

    let mut buf: Vec<u32> = Vec::new();
    match rx.recv_into::<Msg, _>(&mut buf).await? {
        Msg::Control(Command::Ready) => Ok(Links::Spoke(rx, tx)),
        other => Err(unexpected("rendezvous", &other)),
    }
}

async fn recv_metric<'buf>(
    rx: &mut NetRx,
    buf: &'buf mut Vec<u32>,
    expected: usize,
) -> Result<&'buf [f32]> {
    match rx.recv_into::<Msg, _>(buf).await? {
        Msg::Data(Payload::Metric(part)) => {
            expect_len("all_reduce_sum", part.len(), expected)?;
            Ok(part)
        }
        other => Err(unexpected("all_reduce_sum", &other)),
    }
}

async fn recv_grad<'buf>(
    rx: &mut NetRx,
    buf: &'buf mut Vec<u32>,
    expected: usize,
) -> Result<&'buf [f16]> {
    match rx.recv_into::<Msg, _>(buf).await? {
        Msg::Data(Payload::GradFp16(part)) => {
            expect_len("all_reduce_grad", part.len(), expected)?;
            Ok(part)
        }
        other => Err(unexpected("all_reduce_grad", &other)),
    }
}

fn compress(values: &[f32], out: &mut Vec<f16>) {
    out.clear();
    out.extend(values.iter().map(|&v| f16::from_f32(v)));
}

fn decompress(values: &[f16], out: &mut [f32]) {
    for (o, v) in out.iter_mut().zip(values) {
        *o = v.to_f32();
    }
}

fn expect_len(during: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(CollectiveErr::LengthMismatch {
            during,
            got,
            expected,
        });
    }

    Ok(())
}

fn unexpected(during: &'static str, msg: &Msg<'_>) -> CollectiveErr {
    CollectiveErr::UnexpectedMessage {
        during,
        got: msg.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_round_trips_exact_halves() {
        let values = [0.5f32, -2.0, 0.25, 0.0];
        let mut packed = Vec::new();
        compress(&values, &mut packed);

        let mut restored = [0.0f32; 4];
        decompress(&packed, &mut restored);
        assert_eq!(restored, values);
    }

    #[test]
    fn bootstrap_rejects_bad_ranks() {
        let cfg = RendezvousConfig {
            master_addr: "127.0.0.1".to_string(),
            master_port: 0,
            world_size: 2,
            rank: 2,
        };

        assert!(matches!(
            ProcessGroup::bootstrap(&cfg),
            Err(CollectiveErr::Rendezvous { .. })
        ));
    }
}
