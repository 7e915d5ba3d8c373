use std::{fs, path::Path};

use convnet::{CrossEntropyLoss, MultiStepLr, MulticlassAccuracy, ResNet, Sgd, save_checkpoint};
use dataset::Loader;
use log::info;

use crate::{DataParallel, TrainError, plot};

/// Per-epoch scalar histories, each of length exactly `epochs`.
#[derive(Debug, Default, Clone)]
pub struct History {
    pub train_loss: Vec<f32>,
    pub train_acc: Vec<f32>,
    pub test_loss: Vec<f32>,
    pub test_acc: Vec<f32>,
}

impl History {
    fn with_capacity(epochs: usize) -> Self {
        Self {
            train_loss: Vec::with_capacity(epochs),
            train_acc: Vec::with_capacity(epochs),
            test_loss: Vec::with_capacity(epochs),
            test_acc: Vec::with_capacity(epochs),
        }
    }
}

/// Runs the full epoch loop: for each epoch one train pass over the
/// train shard, then one evaluate pass over the test shard, then one
/// schedule step. Logs all four scalars per epoch.
///
/// # Errors
/// Propagates collective, loss and dataset failures.
#[allow(clippy::too_many_arguments)]
pub fn learning(
    model: &mut ResNet,
    ddp: &mut DataParallel,
    train_loader: &mut Loader,
    test_loader: &mut Loader,
    criterion: &CrossEntropyLoss,
    optimizer: &mut Sgd,
    schedule: &mut MultiStepLr,
    epochs: usize,
) -> Result<History, TrainError> {
    let mut history = History::with_capacity(epochs);

    for epoch in 0..epochs {
        train_loader.reset(epoch);
        test_loader.reset(epoch);

        let (train_loss, train_acc) =
            train_pass(model, ddp, train_loader, criterion, optimizer)?;
        let (test_loss, test_acc) = eval_pass(model, ddp, test_loader, criterion)?;

        info!(
            "epoch : {}, train_loss : {train_loss:.6}, train_acc : {train_acc:.6}, \
             test_loss : {test_loss:.6}, test_acc : {test_acc:.6}",
            epoch + 1
        );

        history.train_loss.push(train_loss);
        history.train_acc.push(train_acc);
        history.test_loss.push(test_loss);
        history.test_acc.push(test_acc);

        optimizer.set_lr(schedule.step());
    }

    Ok(history)
}

/// One optimizing pass over this rank's train shard.
///
/// Returns the mean loss (sum of per-batch loss scalars over locally
/// seen samples) and the globally reduced accuracy. Owns a fresh
/// accuracy accumulator for the pass.
///
/// # Errors
/// Propagates collective and loss failures.
pub fn train_pass(
    model: &mut ResNet,
    ddp: &mut DataParallel,
    loader: &mut Loader,
    criterion: &CrossEntropyLoss,
    optimizer: &mut Sgd,
) -> Result<(f32, f32), TrainError> {
    let mut metric = MulticlassAccuracy::new();
    let mut loss_sum = 0.0f32;
    let mut count = 0usize;

    while let Some((images, labels)) = loader.next_batch() {
        count += labels.len();

        optimizer.zero_grad(model);
        let logits = model.forward(&images, true);
        let (loss, dlogits) = criterion.forward(&logits, &labels)?;

        loss_sum += loss;
        metric.update(&logits, &labels);

        model.backward(&dlogits);
        ddp.sync_gradients(model)?;
        optimizer.step(model);
    }

    let mean_loss = if count == 0 { 0.0 } else { loss_sum / count as f32 };
    let mut counts = metric.counts();
    ddp.reduce_counts(&mut counts)?;

    Ok((mean_loss, MulticlassAccuracy::ratio(&counts)))
}

/// One read-only pass over this rank's test shard.
///
/// Same accounting as [`train_pass`] without gradients or parameter
/// updates; batch norm runs on its accumulated statistics.
///
/// # Errors
/// Propagates collective and loss failures.
pub fn eval_pass(
    model: &mut ResNet,
    ddp: &mut DataParallel,
    loader: &mut Loader,
    criterion: &CrossEntropyLoss,
) -> Result<(f32, f32), TrainError> {
    let mut metric = MulticlassAccuracy::new();
    let mut loss_sum = 0.0f32;
    let mut count = 0usize;

    while let Some((images, labels)) = loader.next_batch() {
        count += labels.len();

        let logits = model.forward(&images, false);
        let (loss, _) = criterion.forward(&logits, &labels)?;

        loss_sum += loss;
        metric.update(&logits, &labels);
    }

    let mean_loss = if count == 0 { 0.0 } else { loss_sum / count as f32 };
    let mut counts = metric.counts();
    ddp.reduce_counts(&mut counts)?;

    Ok((mean_loss, MulticlassAccuracy::ratio(&counts)))
}

/// Post-training publication decision: the coordinator writes the
/// checkpoint and charts, every other rank leaves the filesystem
/// untouched. Returns whether this rank published.
///
/// # Errors
/// Propagates [`publish_results`] failures on the coordinator.
pub fn publish_if_coordinator(
    coordinator: bool,
    dir: &Path,
    model: &mut ResNet,
    history: &History,
) -> Result<bool, TrainError> {
    if !coordinator {
        return Ok(false);
    }

    publish_results(dir, model, history)?;
    Ok(true)
}

/// Writes the checkpoint and both curve charts under `<dir>/pv/`,
/// creating the directory if absent.
///
/// # Errors
/// Propagates filesystem, checkpoint and rendering failures.
pub fn publish_results(
    dir: &Path,
    model: &mut ResNet,
    history: &History,
) -> Result<(), TrainError> {
    let pv = dir.join("pv");
    fs::create_dir_all(&pv)?;

    save_checkpoint(model, &pv.join("model.safetensors"))?;
    plot::render_curves(
        &pv.join("rate.png"),
        ("train loss", &history.train_loss),
        ("test loss", &history.test_loss),
    )?;
    plot::render_curves(
        &pv.join("acc.png"),
        ("train acc", &history.train_acc),
        ("test acc", &history.test_acc),
    )?;

    info!("results published under {}", pv.display());
    Ok(())
}
