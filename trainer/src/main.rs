use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use collective::ProcessGroup;
use convnet::{CrossEntropyLoss, MultiStepLr, ResNet, Sgd};
use dataset::{Augment, Cifar10, DistributedSampler, Loader};
use log::info;
use rand::{SeedableRng, rngs::StdRng};
use trainer::{Cli, DataParallel, logging, run};

const BASE_LR: f32 = 0.1;
const MOMENTUM: f32 = 0.9;
const WEIGHT_DECAY: f32 = 1e-4;
const LR_MILESTONES: [usize; 4] = [110, 150, 190, 250];
const LR_GAMMA: f32 = 0.1;
const NUM_CLASSES: usize = 10;

// Shared shuffle seed; all ranks must derive identical permutations.
const SAMPLER_SEED: u64 = 0;

fn main() -> anyhow::Result<()> {
    let cfg = Cli::parse().into_run_config()?;
    let _log = logging::init(&cfg.dir)?;

    let rank = cfg.rendezvous.rank;
    let world = cfg.rendezvous.world_size;
    info!("this process is rank: {rank}");

    let group =
        ProcessGroup::bootstrap(&cfg.rendezvous).context("process-group rendezvous failed")?;

    // Any local init works; the wrapper overwrites it with rank 0's state.
    let mut rng = StdRng::seed_from_u64(rank as u64);
    let mut model = ResNet::resnet101(NUM_CLASSES, &mut rng);
    let mut ddp =
        DataParallel::new(group, &mut model).context("initial state broadcast failed")?;

    let train_data = Cifar10::train(&cfg.dir).context("loading the train split")?;
    let test_data = Cifar10::test(&cfg.dir).context("loading the test split")?;

    let train_sampler =
        DistributedSampler::new(train_data.len(), world, rank, SAMPLER_SEED, true);
    let test_sampler =
        DistributedSampler::new(test_data.len(), world, rank, SAMPLER_SEED, false);
    let mut train_loader =
        Loader::new(train_data, train_sampler, Augment::train(), cfg.bsz, rank as u64);
    let mut test_loader =
        Loader::new(test_data, test_sampler, Augment::eval(), cfg.bsz, rank as u64);

    let criterion = CrossEntropyLoss::new();
    let mut optimizer = Sgd::new(BASE_LR, MOMENTUM, WEIGHT_DECAY);
    let mut schedule = MultiStepLr::new(BASE_LR, LR_MILESTONES.to_vec(), LR_GAMMA);

    let start = Instant::now();
    let history = run::learning(
        &mut model,
        &mut ddp,
        &mut train_loader,
        &mut test_loader,
        &criterion,
        &mut optimizer,
        &mut schedule,
        cfg.epochs,
    )?;

    let coordinator = ddp.is_coordinator();
    ddp.shutdown().context("group teardown failed")?;

    if coordinator {
        info!("process time: {:.3}s", start.elapsed().as_secs_f64());
    }
    run::publish_if_coordinator(coordinator, &cfg.dir, &mut model, &history)?;

    Ok(())
}
