use std::path::Path;

use plotters::prelude::*;

use crate::TrainError;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Renders two per-epoch curves into one PNG, train in blue and test
/// in red over a shared epoch axis. Charts stay text-free so rendering
/// needs no font backend.
///
/// # Errors
/// `TrainError::Plot` on any backend failure.
pub fn render_curves(
    path: &Path,
    train: (&str, &[f32]),
    test: (&str, &[f32]),
) -> Result<(), TrainError> {
    let (train_label, train_values) = train;
    let (test_label, test_values) = test;

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let x_max = train_values.len().max(test_values.len()).max(1) as f32;
    let y_max = train_values
        .iter()
        .chain(test_values)
        .fold(f32::MIN_POSITIVE, |top, &v| top.max(v))
        * 1.05;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0f32..x_max, 0f32..y_max)
        .map_err(plot_err)?;
    chart.configure_mesh().draw().map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(points(train_values), &BLUE))
        .map_err(plot_err)?
        .label(train_label);
    chart
        .draw_series(LineSeries::new(points(test_values), &RED))
        .map_err(plot_err)?
        .label(test_label);

    root.present().map_err(plot_err)?;
    Ok(())
}

fn points(values: &[f32]) -> impl Iterator<Item = (f32, f32)> + '_ {
    values.iter().enumerate().map(|(i, &v)| (i as f32, v))
}

fn plot_err<E: std::fmt::Display>(err: E) -> TrainError {
    TrainError::Plot(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_a_png() {
        let dir = std::env::temp_dir().join("trainer_plot_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rate.png");

        let train = [2.3f32, 1.7, 1.2, 0.9];
        let test = [2.4f32, 1.9, 1.5, 1.3];
        render_curves(&path, ("train loss", &train), ("test loss", &test)).unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
    }

    #[test]
    fn empty_histories_still_render() {
        let dir = std::env::temp_dir().join("trainer_plot_empty_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("acc.png");

        render_curves(&path, ("train acc", &[]), ("test acc", &[])).unwrap();
        assert!(path.is_file());
    }
}
