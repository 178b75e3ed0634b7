//! Transactional CRUD over patients and appointments.
//!
//! Each public operation checks out one pooled connection, runs inside a
//! single transaction and returns rows as stored after the write. The
//! connection goes back to the pool when it is dropped, on every path.

use chrono::{NaiveDateTime, SubsecRound, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;

use crate::db::DbPool;
use crate::error::{Entity, StoreError, StoreResult};
use crate::models::{
    Appointment, AppointmentCreate, AppointmentRead, AppointmentUpdate, Patient, PatientCreate,
    PatientRead, PatientUpdate,
};
use crate::schema::{appointments, patients};

/// Offset/limit window for list queries. Missing fields take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

/// Storage client shared by all request handlers.
#[derive(Clone)]
pub struct Storage {
    pool: DbPool,
}

impl Storage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Runs `f` on a pooled connection; the connection is returned to the
    /// pool when this returns, whatever the outcome.
    fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T>,
    {
        let mut conn = self.pool.get()?;
        f(&mut conn)
    }

    pub fn create_patient(&self, input: &PatientCreate) -> StoreResult<PatientRead> {
        self.with_conn(|conn| {
            let patient = conn.immediate_transaction(|conn| {
                diesel::insert_into(patients::table)
                    .values(input.to_new_patient(creation_time()))
                    .returning(Patient::as_returning())
                    .get_result(conn)
            })?;
            Ok(PatientRead::new(patient, Vec::new()))
        })
    }

    pub fn get_patient(&self, id: i64) -> StoreResult<PatientRead> {
        self.with_conn(|conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let patient = find_patient(conn, id)?;
                with_appointments(conn, patient)
            })
        })
    }

    pub fn list_patients(&self, page: Page) -> StoreResult<Vec<PatientRead>> {
        self.with_conn(|conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let rows = patients::table
                    .select(Patient::as_select())
                    .order(patients::id.asc())
                    .offset(i64::from(page.skip))
                    .limit(i64::from(page.limit))
                    .load(conn)?;
                let owned = Appointment::belonging_to(&rows)
                    .select(Appointment::as_select())
                    .order(appointments::id.asc())
                    .load(conn)?
                    .grouped_by(&rows);
                Ok(rows
                    .into_iter()
                    .zip(owned)
                    .map(|(patient, appointments)| PatientRead::new(patient, appointments))
                    .collect())
            })
        })
    }

    pub fn update_patient(&self, id: i64, changes: &PatientUpdate) -> StoreResult<PatientRead> {
        self.with_conn(|conn| {
            conn.immediate_transaction::<_, StoreError, _>(|conn| {
                let patient = if changes.is_empty() {
                    find_patient(conn, id)?
                } else {
                    diesel::update(patients::table.find(id))
                        .set(changes)
                        .returning(Patient::as_returning())
                        .get_result(conn)
                        .optional()?
                        .ok_or(StoreError::NotFound { entity: Entity::Patient, id })?
                };
                with_appointments(conn, patient)
            })
        })
    }

    /// Deletes the patient and every appointment that references it.
    pub fn delete_patient(&self, id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.immediate_transaction::<_, StoreError, _>(|conn| {
                diesel::delete(appointments::table.filter(appointments::patient_id.eq(id)))
                    .execute(conn)?;
                let removed = diesel::delete(patients::table.find(id)).execute(conn)?;
                if removed == 0 {
                    return Err(StoreError::NotFound { entity: Entity::Patient, id });
                }
                Ok(())
            })
        })
    }

    pub fn create_appointment(&self, input: &AppointmentCreate) -> StoreResult<AppointmentRead> {
        self.with_conn(|conn| {
            let appointment = conn.immediate_transaction::<_, StoreError, _>(|conn| {
                let patient_exists: bool =
                    diesel::select(exists(patients::table.find(input.patient_id)))
                        .get_result(conn)?;
                if !patient_exists {
                    return Err(StoreError::InvalidReference { patient_id: input.patient_id });
                }
                Ok(diesel::insert_into(appointments::table)
                    .values(input)
                    .returning(Appointment::as_returning())
                    .get_result(conn)?)
            })?;
            Ok(appointment.into())
        })
    }

    pub fn get_appointment(&self, id: i64) -> StoreResult<AppointmentRead> {
        self.with_conn(|conn| Ok(find_appointment(conn, id)?.into()))
    }

    pub fn list_appointments(&self, page: Page) -> StoreResult<Vec<AppointmentRead>> {
        self.with_conn(|conn| {
            let rows = appointments::table
                .select(Appointment::as_select())
                .order(appointments::id.asc())
                .offset(i64::from(page.skip))
                .limit(i64::from(page.limit))
                .load(conn)?;
            Ok(rows.into_iter().map(AppointmentRead::from).collect())
        })
    }

    pub fn update_appointment(
        &self,
        id: i64,
        changes: &AppointmentUpdate,
    ) -> StoreResult<AppointmentRead> {
        self.with_conn(|conn| {
            let appointment = conn.immediate_transaction::<_, StoreError, _>(|conn| {
                if changes.is_empty() {
                    return find_appointment(conn, id);
                }
                diesel::update(appointments::table.find(id))
                    .set(changes)
                    .returning(Appointment::as_returning())
                    .get_result(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound { entity: Entity::Appointment, id })
            })?;
            Ok(appointment.into())
        })
    }

    pub fn delete_appointment(&self, id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            let removed = diesel::delete(appointments::table.find(id)).execute(conn)?;
            if removed == 0 {
                return Err(StoreError::NotFound { entity: Entity::Appointment, id });
            }
            Ok(())
        })
    }
}

// Creation stamps carry microsecond precision.
fn creation_time() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

fn with_appointments(conn: &mut SqliteConnection, patient: Patient) -> StoreResult<PatientRead> {
    let appointments = Appointment::belonging_to(&patient)
        .select(Appointment::as_select())
        .order(appointments::id.asc())
        .load(conn)?;
    Ok(PatientRead::new(patient, appointments))
}

fn find_patient(conn: &mut SqliteConnection, id: i64) -> StoreResult<Patient> {
    patients::table
        .find(id)
        .select(Patient::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound { entity: Entity::Patient, id })
}

fn find_appointment(conn: &mut SqliteConnection, id: i64) -> StoreResult<Appointment> {
    appointments::table
        .find(id)
        .select(Appointment::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound { entity: Entity::Appointment, id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::models::parse_timestamp;
    use chrono::Timelike;
    use std::time::Duration;
    use tempfile::TempDir;

    fn storage() -> (TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.db");
        let pool = init_pool(path.to_str().unwrap(), 2, Duration::from_secs(1)).unwrap();
        (dir, Storage::new(pool))
    }

    fn patient(name: &str, age: Option<i64>, gender: Option<&str>) -> PatientCreate {
        PatientCreate {
            name: name.to_string(),
            age,
            gender: gender.map(str::to_string),
        }
    }

    fn appointment(patient_id: i64, date: &str) -> AppointmentCreate {
        AppointmentCreate {
            patient_id,
            date: parse_timestamp(date).unwrap(),
            reason: None,
        }
    }

    #[test]
    fn create_then_get_returns_same_fields() {
        let (_dir, storage) = storage();
        let created = storage
            .create_patient(&patient("Ada", Some(36), Some("female")))
            .unwrap();
        assert!(created.appointments.is_empty());

        let loaded = storage.get_patient(created.id).unwrap();
        assert_eq!(loaded.name, "Ada");
        assert_eq!(loaded.age, Some(36));
        assert_eq!(loaded.gender.as_deref(), Some("female"));
        assert_eq!(loaded.created_at, created.created_at);
    }

    #[test]
    fn created_at_is_truncated_to_microseconds() {
        let (_dir, storage) = storage();
        let created = storage.create_patient(&patient("Micro", None, None)).unwrap();
        assert_eq!(created.created_at.nanosecond() % 1_000, 0);
        assert_eq!(storage.get_patient(created.id).unwrap().created_at, created.created_at);
    }

    #[test]
    fn ids_beyond_32_bits_are_missing_not_invalid() {
        let (_dir, storage) = storage();
        let huge = 4_294_967_296;
        assert!(matches!(
            storage.get_patient(huge),
            Err(StoreError::NotFound { entity: Entity::Patient, id }) if id == huge
        ));
        assert!(matches!(
            storage.create_appointment(&appointment(huge, "2024-01-01T10:00:00")),
            Err(StoreError::InvalidReference { patient_id }) if patient_id == huge
        ));
    }

    #[test]
    fn get_missing_patient_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.get_patient(42).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Patient, id: 42 }));
    }

    #[test]
    fn partial_update_keeps_absent_fields() {
        let (_dir, storage) = storage();
        let created = storage
            .create_patient(&patient("Grace", Some(40), Some("female")))
            .unwrap();

        let changes = PatientUpdate {
            age: Some(41),
            ..Default::default()
        };
        let updated = storage.update_patient(created.id, &changes).unwrap();
        assert_eq!(updated.age, Some(41));
        assert_eq!(updated.name, "Grace");
        assert_eq!(updated.gender.as_deref(), Some("female"));
    }

    #[test]
    fn empty_update_rereads_or_reports_missing() {
        let (_dir, storage) = storage();
        let created = storage.create_patient(&patient("Linus", None, None)).unwrap();

        let same = storage
            .update_patient(created.id, &PatientUpdate::default())
            .unwrap();
        assert_eq!(same, created);

        let err = storage
            .update_patient(created.id + 1, &PatientUpdate::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn update_missing_patient_is_not_found() {
        let (_dir, storage) = storage();
        let changes = PatientUpdate {
            name: Some("Nobody".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            storage.update_patient(9, &changes),
            Err(StoreError::NotFound { entity: Entity::Patient, id: 9 })
        ));
    }

    #[test]
    fn list_patients_respects_skip_and_limit() {
        let (_dir, storage) = storage();
        for name in ["first", "second", "third"] {
            storage.create_patient(&patient(name, None, None)).unwrap();
        }

        let page = storage.list_patients(Page { skip: 1, limit: 1 }).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "second");

        let all = storage.list_patients(Page::default()).unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn list_patients_embeds_each_patients_appointments() {
        let (_dir, storage) = storage();
        let a = storage.create_patient(&patient("a", None, None)).unwrap();
        let b = storage.create_patient(&patient("b", None, None)).unwrap();
        storage.create_appointment(&appointment(b.id, "2024-02-01T09:00:00")).unwrap();
        storage.create_appointment(&appointment(b.id, "2024-02-02T09:00:00")).unwrap();

        let all = storage.list_patients(Page::default()).unwrap();
        assert_eq!(all[0].id, a.id);
        assert!(all[0].appointments.is_empty());
        assert_eq!(all[1].appointments.len(), 2);
        assert!(all[1].appointments.iter().all(|appt| appt.patient_id == b.id));
    }

    #[test]
    fn appointment_for_missing_patient_is_rejected_and_not_stored() {
        let (_dir, storage) = storage();
        let err = storage
            .create_appointment(&appointment(99, "2024-01-01T10:00:00"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { patient_id: 99 }));
        assert!(storage.list_appointments(Page::default()).unwrap().is_empty());
    }

    #[test]
    fn deleting_patient_removes_its_appointments() {
        let (_dir, storage) = storage();
        let kept = storage.create_patient(&patient("kept", None, None)).unwrap();
        let gone = storage.create_patient(&patient("gone", None, None)).unwrap();
        let keep_appt = storage
            .create_appointment(&appointment(kept.id, "2024-01-01T10:00:00"))
            .unwrap();
        let first = storage
            .create_appointment(&appointment(gone.id, "2024-01-02T10:00:00"))
            .unwrap();
        let second = storage
            .create_appointment(&appointment(gone.id, "2024-01-03T10:00:00"))
            .unwrap();

        storage.delete_patient(gone.id).unwrap();

        for id in [first.id, second.id] {
            assert!(matches!(
                storage.get_appointment(id),
                Err(StoreError::NotFound { entity: Entity::Appointment, .. })
            ));
        }
        assert_eq!(storage.get_appointment(keep_appt.id).unwrap(), keep_appt);
        assert!(matches!(
            storage.delete_patient(gone.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn appointment_update_only_touches_given_fields() {
        let (_dir, storage) = storage();
        let owner = storage.create_patient(&patient("owner", None, None)).unwrap();
        let created = storage
            .create_appointment(&AppointmentCreate {
                reason: Some("checkup".to_string()),
                ..appointment(owner.id, "2024-01-01T10:00:00")
            })
            .unwrap();

        let moved = storage
            .update_appointment(
                created.id,
                &AppointmentUpdate {
                    date: Some(parse_timestamp("2024-06-01T08:30:00").unwrap()),
                    reason: None,
                },
            )
            .unwrap();
        assert_eq!(moved.date, parse_timestamp("2024-06-01T08:30:00").unwrap());
        assert_eq!(moved.reason.as_deref(), Some("checkup"));
        assert_eq!(moved.patient_id, owner.id);
    }

    #[test]
    fn delete_appointment_is_standalone() {
        let (_dir, storage) = storage();
        let owner = storage.create_patient(&patient("owner", None, None)).unwrap();
        let appt = storage
            .create_appointment(&appointment(owner.id, "2024-01-01T10:00:00"))
            .unwrap();

        storage.delete_appointment(appt.id).unwrap();
        assert!(storage.get_patient(owner.id).unwrap().appointments.is_empty());
        assert!(matches!(
            storage.delete_appointment(appt.id),
            Err(StoreError::NotFound { entity: Entity::Appointment, .. })
        ));
    }
}
