//! Class roster: add, list and remove students for one class at a time, with
//! the whole roster persisted under a single store key and every new student
//! provisioned in the exam bank.

mod error;
mod ids;
mod model;
mod store;

pub use error::RosterError;
pub use ids::{IdFormat, IdGenerator};
pub use model::{ClassId, Student};
pub use store::{RosterStore, SqliteStore};

use icu_collator::{Collator, CollatorOptions, Strength};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::config::RosterSettings;
use crate::exams::{ExamProvisioner, ProvisionError};
use model::Roster;

/// Answer to the "are you sure?" prompt shown before a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

impl Confirmation {
    pub fn from_flag(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::Declined
        }
    }
}

#[derive(Debug)]
pub enum Provisioning {
    Provisioned,
    /// The roster entry is committed regardless; `reconcile` can retry.
    Failed(ProvisionError),
}

#[derive(Debug)]
pub struct AddedStudent {
    pub student: Student,
    pub roster_size: usize,
    pub provisioning: Provisioning,
}

#[derive(Debug)]
pub enum Release {
    Released,
    NothingAllocated,
    Skipped,
    Failed(ProvisionError),
}

#[derive(Debug)]
pub enum RemoveOutcome {
    Declined,
    NotFound,
    /// Every entry that carried the id; legacy lists may hold duplicates.
    Removed {
        students: Vec<Student>,
        release: Release,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub provisioned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub class_id: ClassId,
    pub student_count: usize,
}

enum Edit<T> {
    Write(T),
    Unchanged(T),
}

pub struct RosterManager<'a, S, P> {
    store: S,
    exams: P,
    ids: &'a IdGenerator,
    settings: &'a RosterSettings,
}

impl<'a, S: RosterStore, P: ExamProvisioner> RosterManager<'a, S, P> {
    pub fn new(store: S, exams: P, ids: &'a IdGenerator, settings: &'a RosterSettings) -> Self {
        Self {
            store,
            exams,
            ids,
            settings,
        }
    }

    pub fn add_student(
        &self,
        class: &ClassId,
        full_name: &str,
    ) -> Result<AddedStudent, RosterError> {
        let name = full_name.trim();
        if name.is_empty() {
            return Err(RosterError::EmptyName);
        }

        let format = self.settings.id_format();
        let (student, roster_size) = self.update(class, |roster| {
            let minted = self
                .ids
                .mint(class, &format, |id| roster.contains_id(class, id));
            let student = Student {
                id: minted.id,
                full_name: name.to_string(),
                student_id: minted.student_id,
            };
            let students = roster.class_mut(class);
            students.push(student.clone());
            Edit::Write((student, students.len()))
        })?;
        info!(%class, id = %student.id, roster_size, "student added");

        let provisioning =
            match self
                .exams
                .initialize_student_scores(&student.id, class, &student.full_name)
            {
                Ok(()) => Provisioning::Provisioned,
                Err(e) => {
                    warn!(%class, id = %student.id, error = %e, "exam bank provisioning failed");
                    Provisioning::Failed(e)
                }
            };

        Ok(AddedStudent {
            student,
            roster_size,
            provisioning,
        })
    }

    /// Class roster sorted by name; the stored order is left as is.
    pub fn list_students(&self, class: &ClassId) -> Result<Vec<Student>, RosterError> {
        let (roster, _) = self.load()?;
        let order = NameOrder::root()?;
        let mut students = roster.class(class).to_vec();
        students.sort_by(|a, b| order.compare(&a.full_name, &b.full_name));
        Ok(students)
    }

    pub fn remove_student(
        &self,
        class: &ClassId,
        student_id: &str,
        confirmation: Confirmation,
    ) -> Result<RemoveOutcome, RosterError> {
        if confirmation == Confirmation::Declined {
            debug!(%class, id = student_id, "removal not confirmed");
            return Ok(RemoveOutcome::Declined);
        }

        let students = self.update(class, |roster| {
            let gone = roster.remove(class, student_id);
            if gone.is_empty() {
                Edit::Unchanged(gone)
            } else {
                Edit::Write(gone)
            }
        })?;
        if students.is_empty() {
            debug!(%class, id = student_id, "nothing to remove");
            return Ok(RemoveOutcome::NotFound);
        }
        info!(%class, id = student_id, entries = students.len(), "student removed");

        let release = if !self.settings.release_exam_slots_on_remove {
            Release::Skipped
        } else {
            match self.exams.release_student_scores(student_id) {
                Ok(true) => Release::Released,
                Ok(false) => Release::NothingAllocated,
                Err(e) => {
                    warn!(%class, id = student_id, error = %e, "exam bank release failed");
                    Release::Failed(e)
                }
            }
        };

        Ok(RemoveOutcome::Removed { students, release })
    }

    /// Provisions every student in `class` that the exam bank does not know yet.
    pub fn reconcile(&self, class: &ClassId) -> Result<ReconcileReport, RosterError> {
        let (roster, _) = self.load()?;
        let mut report = ReconcileReport::default();
        for student in roster.class(class) {
            report.checked += 1;
            if self.exams.is_provisioned(&student.id)? {
                continue;
            }
            self.exams
                .initialize_student_scores(&student.id, class, &student.full_name)?;
            report.provisioned.push(student.id.clone());
        }
        if !report.provisioned.is_empty() {
            info!(%class, count = report.provisioned.len(), "reprovisioned students");
        }
        Ok(report)
    }

    pub fn class_summaries(&self) -> Result<Vec<ClassSummary>, RosterError> {
        let (roster, _) = self.load()?;
        Ok(summarize(&roster))
    }

    /// Replaces the whole roster with a `classLists` JSON dump, e.g. one
    /// lifted from the browser's local storage. Unlike reads, bad input is an error.
    pub fn import_class_lists(&self, raw: &str) -> Result<Vec<ClassSummary>, RosterError> {
        let roster =
            Roster::decode(raw).map_err(|e| RosterError::InvalidImport(e.to_string()))?;
        self.store.set(&self.settings.storage_key, &roster.encode()?)?;
        let summaries = summarize(&roster);
        info!(classes = summaries.len(), "roster imported");
        Ok(summaries)
    }

    fn load(&self) -> Result<(Roster, Option<i64>), RosterError> {
        let key = &self.settings.storage_key;
        let Some(stored) = self.store.get(key)? else {
            return Ok((Roster::default(), None));
        };
        match Roster::decode(&stored.raw) {
            Ok(roster) => Ok((roster, Some(stored.version))),
            Err(e) => {
                // Unreadable content counts as empty; the next write replaces it.
                warn!(key = %key, error = %e, "stored roster unreadable; treating as empty");
                Ok((Roster::default(), Some(stored.version)))
            }
        }
    }

    /// Read-modify-write of the whole roster, retried when another writer
    /// bumps the stored version between our read and our write.
    fn update<T>(
        &self,
        class: &ClassId,
        mut mutate: impl FnMut(&mut Roster) -> Edit<T>,
    ) -> Result<T, RosterError> {
        let key = &self.settings.storage_key;
        let attempts = self.settings.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let (mut roster, version) = self.load()?;
            let out = match mutate(&mut roster) {
                Edit::Unchanged(out) => return Ok(out),
                Edit::Write(out) => out,
            };
            let raw = roster.encode()?;
            if self.store.compare_and_set(key, version, &raw)? {
                return Ok(out);
            }
            debug!(%class, attempt, "roster changed underneath; retrying");
        }
        Err(RosterError::WriteConflict {
            class: class.clone(),
            attempts,
        })
    }
}

fn summarize(roster: &Roster) -> Vec<ClassSummary> {
    roster
        .classes()
        .map(|(class_id, students)| ClassSummary {
            class_id: class_id.clone(),
            student_count: students.len(),
        })
        .collect()
}

/// Root-locale collation for student names: base letters decide first, so
/// `Émeka` sits with the E's; accents next, then case with lowercase ahead.
/// Names that collate equal fall back to code points to keep the sort total.
pub struct NameOrder {
    collator: Collator,
}

impl NameOrder {
    pub fn root() -> Result<Self, RosterError> {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        let collator = Collator::try_new(&Default::default(), options)
            .map_err(|e| RosterError::Collation(format!("{e:?}")))?;
        Ok(Self { collator })
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.collator.compare(a, b).then_with(|| a.cmp(b))
    }
}
