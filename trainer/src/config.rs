use std::path::PathBuf;

use clap::Parser;
use collective::RendezvousConfig;

use crate::TrainError;

/// Command-line flags of the training driver.
#[derive(Debug, Parser)]
#[command(about = "Data-parallel CIFAR-10 training with fp16 gradient compression")]
pub struct Cli {
    /// Address rank 0 binds and every other rank connects to.
    #[arg(long, default_value = "127.0.0.1")]
    pub master_addr: String,

    /// Port of the rendezvous endpoint.
    #[arg(long, default_value_t = 62001)]
    pub master_port: u16,

    /// Total number of training processes.
    #[arg(long, default_value_t = 2)]
    pub world_size: usize,

    /// This process's rank, 0 through world_size - 1.
    #[arg(long, default_value_t = 0)]
    pub local_rank: usize,

    /// Root directory for CIFAR10/, logs/ and pv/ outputs.
    #[arg(long, default_value = "./")]
    pub dir: PathBuf,

    /// Per-process batch size.
    #[arg(long, default_value_t = 32)]
    pub bsz: usize,

    /// Number of training epochs.
    #[arg(long, default_value_t = 300)]
    pub epoch: usize,
}

/// A validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub rendezvous: RendezvousConfig,
    pub dir: PathBuf,
    pub bsz: usize,
    pub epochs: usize,
}

impl Cli {
    /// Validates the flags and produces the run configuration.
    ///
    /// # Errors
    /// `TrainError::InvalidConfig` on an impossible flag combination.
    pub fn into_run_config(self) -> Result<RunConfig, TrainError> {
        if self.world_size == 0 {
            return Err(TrainError::InvalidConfig("world-size must be >= 1".into()));
        }
        if self.local_rank >= self.world_size {
            return Err(TrainError::InvalidConfig(format!(
                "local-rank {} is out of range for world-size {}",
                self.local_rank, self.world_size
            )));
        }
        if self.bsz == 0 {
            return Err(TrainError::InvalidConfig("bsz must be >= 1".into()));
        }

        Ok(RunConfig {
            rendezvous: RendezvousConfig {
                master_addr: self.master_addr,
                master_port: self.master_port,
                world_size: self.world_size,
                rank: self.local_rank,
            },
            dir: self.dir,
            bsz: self.bsz,
            epochs: self.epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("trainer").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let cfg = parse(&[]).into_run_config().unwrap();
        assert_eq!(cfg.rendezvous.master_addr, "127.0.0.1");
        assert_eq!(cfg.rendezvous.master_port, 62001);
        assert_eq!(cfg.rendezvous.world_size, 2);
        assert_eq!(cfg.rendezvous.rank, 0);
        assert_eq!(cfg.dir, PathBuf::from("./"));
        assert_eq!(cfg.bsz, 32);
        assert_eq!(cfg.epochs, 300);
    }

    #[test]
    fn rank_must_fit_the_world() {
        let cli = parse(&["--world-size", "2", "--local-rank", "2"]);
        assert!(matches!(
            cli.into_run_config(),
            Err(TrainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(parse(&["--world-size", "0"]).into_run_config().is_err());
        assert!(parse(&["--bsz", "0"]).into_run_config().is_err());
    }
}
