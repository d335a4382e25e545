use std::time::Instant;
use tracing::info;

/// Logs how long a scope took when dropped.
pub struct Timer {
    what: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(what: &'static str) -> Self {
        info!("⏱  {what}…");
        Self { what, started: Instant::now() }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  {} done in {:.2?}", self.what, self.started.elapsed());
    }
}

/// `1234567` → `1,234,567`
pub fn fmt_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
