use std::collections::VecDeque;

/// Streaming Relative Strength Index
///
/// Uses a simple average of the last `period` gains and losses.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
#[derive(Debug, Clone)]
pub struct RelativeStrength {
    period: usize,
    previous: Option<f64>,
    changes: VecDeque<f64>,
}

impl RelativeStrength {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            previous: None,
            changes: VecDeque::with_capacity(period + 1),
        }
    }

    /// Closes needed before the first value is produced
    pub fn warmup(&self) -> usize {
        self.period + 1
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        if let Some(previous) = self.previous.replace(close) {
            self.changes.push_back(close - previous);
            while self.changes.len() > self.period {
                self.changes.pop_front();
            }
        }

        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.changes.len() < self.period {
            return None;
        }

        let (gains, losses) = self.changes.iter().fold((0.0, 0.0), |(g, l), &c| {
            if c > 0.0 {
                (g + c, l)
            } else {
                (g, l - c)
            }
        });
        let avg_gain = gains / self.period as f64;
        let avg_loss = losses / self.period as f64;

        if avg_loss == 0.0 {
            return Some(100.0);
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - (100.0 / (1.0 + rs)))
    }
}
