use crate::sen5x::{AveragedMeasurement, SensorMeasurement};

/// Averages a batch channel by channel with truncating integer division.
///
/// Each channel is summed in 64 bits and divided once. Samples without a value for a channel
/// are left out of that channel's mean, so a channel is only `None` in the result when no
/// sample carried a value for it. Returns `None` for an empty batch.
pub fn reduce(samples: &[SensorMeasurement]) -> Option<AveragedMeasurement> {
    if samples.is_empty() {
        return None;
    }

    let values = SensorMeasurement {
        pm1_0: mean_pm(samples, |s| s.pm1_0),
        pm2_5: mean_pm(samples, |s| s.pm2_5),
        pm4_0: mean_pm(samples, |s| s.pm4_0),
        pm10_0: mean_pm(samples, |s| s.pm10_0),
        humidity: mean_present(samples, |s| s.humidity),
        temperature: mean_present(samples, |s| s.temperature),
        voc_index: mean_present(samples, |s| s.voc_index),
        nox_index: mean_present(samples, |s| s.nox_index),
    };

    Some(AveragedMeasurement {
        values,
        sample_count: samples.len(),
    })
}

fn mean_pm(
    samples: &[SensorMeasurement],
    channel: impl Fn(&SensorMeasurement) -> Option<u32>,
) -> Option<u32> {
    let (sum, count) = samples
        .iter()
        .filter_map(channel)
        .fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v), count + 1));

    if count == 0 {
        return None;
    }

    // the mean of u32 values always fits in u32
    Some((sum / count) as u32)
}

fn mean_present(
    samples: &[SensorMeasurement],
    channel: impl Fn(&SensorMeasurement) -> Option<i32>,
) -> Option<i32> {
    let (sum, count) = samples
        .iter()
        .filter_map(channel)
        .fold((0i64, 0i64), |(sum, count), v| (sum + i64::from(v), count + 1));

    if count == 0 {
        return None;
    }

    // i64 division truncates toward zero, like the device's own float-to-int conversion
    Some((sum / count) as i32)
}
