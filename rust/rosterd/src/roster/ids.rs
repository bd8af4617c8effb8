use std::sync::atomic::{AtomicI64, Ordering};

use super::model::ClassId;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// How minted ids are spelled; comes from the `setup.roster` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdFormat {
    pub separator: String,
    pub display_prefix: String,
    pub display_digits: usize,
}

impl Default for IdFormat {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
            display_prefix: "STU".to_string(),
            display_digits: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedIds {
    pub id: String,
    pub student_id: String,
}

/// Timestamp-shaped ids (`JSS1_1700000001234`, `STU1234`) whose stamps
/// strictly increase for the life of the process.
pub struct IdGenerator {
    clock: Box<dyn Clock>,
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            last: AtomicI64::new(i64::MIN),
        }
    }

    pub fn system() -> Self {
        Self::new(SystemClock)
    }

    fn next_stamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(prev.saturating_add(1))
    }

    /// Mints ids for `class`, skipping any id `taken` reports as in use.
    pub fn mint(
        &self,
        class: &ClassId,
        format: &IdFormat,
        taken: impl Fn(&str) -> bool,
    ) -> MintedIds {
        loop {
            let stamp = self.next_stamp();
            let id = format!("{}{}{}", class, format.separator, stamp);
            if taken(&id) {
                continue;
            }
            return MintedIds {
                student_id: display_id(stamp, format),
                id,
            };
        }
    }
}

fn display_id(stamp: i64, format: &IdFormat) -> String {
    let digits = stamp.to_string();
    let tail = digits.len().saturating_sub(format.display_digits);
    format!("{}{}", format.display_prefix, &digits[tail..])
}

#[cfg(test)]
pub(crate) struct FixedClock(pub i64);

#[cfg(test)]
impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}
