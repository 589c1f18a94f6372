use std::ops::Range;

/// Sliding windows over a series, each labelled with the value that follows it.
///
/// Windows keep the series' temporal order; nothing here ever shuffles.
#[derive(Debug, Clone, Default)]
pub struct WindowedDataset {
    windows: Vec<Vec<f64>>,
    labels: Vec<f64>,
    window_size: usize,
}

impl WindowedDataset {
    /// Window `i` is `series[i..i + w]` with label `series[i + w]`, for `i` in `0..n - w`.
    /// A series no longer than the window yields an empty dataset.
    pub fn build(series: &[f64], window_size: usize) -> Self {
        if window_size == 0 || series.len() <= window_size {
            return Self {
                windows: Vec::new(),
                labels: Vec::new(),
                window_size,
            };
        }

        let windows = series
            .windows(window_size)
            .take(series.len() - window_size)
            .map(|w| w.to_vec())
            .collect();
        let labels = series[window_size..].to_vec();

        Self {
            windows,
            labels,
            window_size,
        }
    }

    pub fn windows(&self) -> &[Vec<f64>] {
        &self.windows
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.windows
            .iter()
            .map(|w| w.as_slice())
            .zip(self.labels.iter().copied())
    }

    /// Contiguous sub-range of windows, order preserved.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            windows: self.windows[start..end].to_vec(),
            labels: self.labels[start..end].to_vec(),
            window_size: self.window_size,
        }
    }
}

/// The trailing `window_size` values: the input for the production forecast.
pub fn last_window(series: &[f64], window_size: usize) -> Option<&[f64]> {
    if window_size == 0 || series.len() < window_size {
        return None;
    }
    Some(&series[series.len() - window_size..])
}
