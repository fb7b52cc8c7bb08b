//! Single-line textual progress bar for copy progress channels.

use std::io::{self, Stdout, Write};
use tokio::sync::mpsc;

/// Number of cells between the brackets.
pub const BAR_WIDTH: usize = 100;

const FILLED: char = '#';
const EMPTY: char = ' ';
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Renders `[####    ][42.00%][/]` lines, redrawn in place with `\r`.
///
/// Every render advances the spinner by one frame.
pub struct ProgressBar<W: Write = Stdout> {
    out: W,
    frame: usize,
}

impl ProgressBar<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ProgressBar<W> {
    pub fn new(out: W) -> Self {
        Self { out, frame: 0 }
    }

    pub fn render(&mut self, current: u64, total: u64) -> String {
        let pct = percent(current, total);
        let filled = (BAR_WIDTH as u64 * pct / 100) as usize;
        let spinner = SPINNER[self.frame % SPINNER.len()];
        self.frame = self.frame.wrapping_add(1);

        let mut line = String::with_capacity(BAR_WIDTH + 16);
        line.push('[');
        line.extend(std::iter::repeat(FILLED).take(filled));
        line.extend(std::iter::repeat(EMPTY).take(BAR_WIDTH - filled));
        line.push_str(&format!("][{:.2}%][{}]", pct as f64, spinner));
        line
    }

    pub fn print(&mut self, current: u64, total: u64) -> io::Result<()> {
        let line = self.render(current, total);
        write!(self.out, "\r{}", line)?;
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Print every sample until the producer closes the channel, then end the
    /// line. Returns the last sample seen (0 if none).
    pub async fn drain(&mut self, mut rx: mpsc::Receiver<u64>, total: u64) -> io::Result<u64> {
        let mut last = 0;
        while let Some(current) = rx.recv().await {
            last = current;
            self.print(current, total)?;
        }
        self.finish()?;
        Ok(last)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `(current + 1) * 100 / total` in integer arithmetic, clamped to 100.
fn percent(current: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    (current.saturating_add(1).saturating_mul(100) / total).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(line: &str, c: char) -> usize {
        line[1..=BAR_WIDTH].chars().filter(|&x| x == c).count()
    }

    #[test]
    fn test_empty_bar() {
        let mut bar = ProgressBar::new(Vec::new());
        let line = bar.render(0, 1000);
        assert_eq!(line.len(), BAR_WIDTH + 2 + "[0.00%]".len() + 3);
        assert_eq!(cells(&line, FILLED), 0);
        assert!(line.ends_with("][0.00%][|]"));
    }

    #[test]
    fn test_half_bar() {
        let mut bar = ProgressBar::new(Vec::new());
        let line = bar.render(499, 1000);
        assert_eq!(cells(&line, FILLED), 50);
        assert_eq!(cells(&line, EMPTY), 50);
        assert!(line.contains("[50.00%]"));
    }

    #[test]
    fn test_clamps_at_one_hundred() {
        let mut bar = ProgressBar::new(Vec::new());
        let line = bar.render(5000, 1000);
        assert_eq!(cells(&line, FILLED), BAR_WIDTH);
        assert!(line.contains("[100.00%]"));
        // off-by-one rounding reaches 100% one byte early
        assert_eq!(percent(999, 1000), 100);
    }

    #[test]
    fn test_zero_total_is_complete() {
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_spinner_cycles() {
        let mut bar = ProgressBar::new(Vec::new());
        let frames: Vec<char> = (0..5)
            .map(|_| bar.render(1, 10).chars().rev().nth(1).unwrap())
            .collect();
        assert_eq!(frames, vec!['|', '/', '-', '\\', '|']);
    }

    #[test]
    fn test_print_and_finish_write_control_chars() {
        let mut bar = ProgressBar::new(Vec::new());
        bar.print(0, 10).unwrap();
        bar.finish().unwrap();
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert!(out.starts_with('\r'));
        assert!(out.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_drain_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        let producer = tokio::spawn(async move {
            for v in [10u64, 50, 100] {
                tx.send(v).await.unwrap();
            }
        });
        let mut bar = ProgressBar::new(Vec::new());
        let last = bar.drain(rx, 100).await.unwrap();
        producer.await.unwrap();

        assert_eq!(last, 100);
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(out.matches('\r').count(), 3);
        assert!(out.ends_with("[100.00%][-]\n"));
    }
}
