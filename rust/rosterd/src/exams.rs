use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ExamBankSettings;
use crate::roster::ClassId;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("exam bank storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("exam bank rejected {student_id}: {reason}")]
    Rejected { student_id: String, reason: String },
}

/// Exam-scoring side of the roster: allocates and frees per-student score slots.
pub trait ExamProvisioner {
    /// Allocates slots for a freshly added student. Idempotent per `student_id`.
    fn initialize_student_scores(
        &self,
        student_id: &str,
        class_id: &ClassId,
        full_name: &str,
    ) -> Result<(), ProvisionError>;

    /// Frees a student's slots; `false` if nothing was allocated.
    fn release_student_scores(&self, student_id: &str) -> Result<bool, ProvisionError>;

    fn is_provisioned(&self, student_id: &str) -> Result<bool, ProvisionError>;
}

impl<T: ExamProvisioner + ?Sized> ExamProvisioner for &T {
    fn initialize_student_scores(
        &self,
        student_id: &str,
        class_id: &ClassId,
        full_name: &str,
    ) -> Result<(), ProvisionError> {
        (**self).initialize_student_scores(student_id, class_id, full_name)
    }

    fn release_student_scores(&self, student_id: &str) -> Result<bool, ProvisionError> {
        (**self).release_student_scores(student_id)
    }

    fn is_provisioned(&self, student_id: &str) -> Result<bool, ProvisionError> {
        (**self).is_provisioned(student_id)
    }
}

pub struct SqliteExamBank<'c> {
    conn: &'c Connection,
    layout: ExamBankSettings,
}

impl<'c> SqliteExamBank<'c> {
    pub fn new(conn: &'c Connection, layout: ExamBankSettings) -> Self {
        Self { conn, layout }
    }
}

impl ExamProvisioner for SqliteExamBank<'_> {
    fn initialize_student_scores(
        &self,
        student_id: &str,
        class_id: &ClassId,
        full_name: &str,
    ) -> Result<(), ProvisionError> {
        if self.layout.components.is_empty() || self.layout.terms == 0 {
            return Err(ProvisionError::Rejected {
                student_id: student_id.to_string(),
                reason: "exam bank has no terms or components configured".into(),
            });
        }

        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO exam_bank_students(student_id, class_id, full_name, created_at)
             VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (student_id, class_id.as_str(), full_name),
        )?;
        if inserted == 0 {
            // Already provisioned; keep existing slots and any scores in them.
            tx.rollback()?;
            return Ok(());
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO exam_bank_slots(id, student_id, term, component, score)
                 VALUES(?, ?, ?, ?, NULL)",
            )?;
            for term in 1..=self.layout.terms {
                for component in &self.layout.components {
                    stmt.execute((
                        Uuid::new_v4().to_string(),
                        student_id,
                        term,
                        component.as_str(),
                    ))?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn release_student_scores(&self, student_id: &str) -> Result<bool, ProvisionError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM exam_bank_slots WHERE student_id = ?",
            [student_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM exam_bank_students WHERE student_id = ?",
            [student_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn is_provisioned(&self, student_id: &str) -> Result<bool, ProvisionError> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM exam_bank_students WHERE student_id = ?",
                [student_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedStudent {
    pub student_id: String,
    pub full_name: String,
    pub slot_count: i64,
    pub created_at: Option<String>,
}

pub fn list_class(
    conn: &Connection,
    class_id: &ClassId,
) -> Result<Vec<ProvisionedStudent>, ProvisionError> {
    let mut stmt = conn.prepare(
        "SELECT
           s.student_id,
           s.full_name,
           (SELECT COUNT(*) FROM exam_bank_slots sl WHERE sl.student_id = s.student_id),
           s.created_at
         FROM exam_bank_students s
         WHERE s.class_id = ?
         ORDER BY s.full_name, s.student_id",
    )?;
    let rows = stmt
        .query_map([class_id.as_str()], |row| {
            Ok(ProvisionedStudent {
                student_id: row.get(0)?,
                full_name: row.get(1)?,
                slot_count: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
