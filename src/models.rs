use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{appointments, patients};

// Stored rows

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = patients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = patients)]
pub struct NewPatient<'a> {
    pub name: &'a str,
    pub age: Option<i64>,
    pub gender: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(belongs_to(Patient))]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub date: NaiveDateTime,
    pub reason: Option<String>,
}

// Request bodies

#[derive(Debug, Clone, Deserialize)]
pub struct PatientCreate {
    pub name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl PatientCreate {
    pub fn to_new_patient(&self, created_at: NaiveDateTime) -> NewPatient<'_> {
        NewPatient {
            name: &self.name,
            age: self.age,
            gender: self.gender.as_deref(),
            created_at,
        }
    }
}

/// Partial patient update. `None` fields are left out of the `UPDATE`.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = patients)]
pub struct PatientUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl PatientUpdate {
    /// Diesel rejects an `UPDATE` with no assignments, so callers check first.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.gender.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = appointments)]
pub struct AppointmentCreate {
    pub patient_id: i64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Partial appointment update. The owning patient cannot be changed.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = appointments)]
pub struct AppointmentUpdate {
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub date: Option<NaiveDateTime>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AppointmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.reason.is_none()
    }
}

// Response bodies

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRead {
    pub id: i64,
    pub patient_id: i64,
    pub date: NaiveDateTime,
    pub reason: Option<String>,
}

impl From<Appointment> for AppointmentRead {
    fn from(row: Appointment) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            date: row.date,
            reason: row.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRead {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub created_at: NaiveDateTime,
    pub appointments: Vec<AppointmentRead>,
}

impl PatientRead {
    pub fn new(patient: Patient, appointments: Vec<Appointment>) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
            age: patient.age,
            gender: patient.gender,
            created_at: patient.created_at,
            appointments: appointments.into_iter().map(AppointmentRead::from).collect(),
        }
    }
}

/// Parses an ISO-8601 timestamp into the naive form stored in SQLite.
///
/// Values carrying an offset (`Z`, `+02:00`) are normalised to UTC; naive
/// values are kept as given and a bare date means midnight. The date and time
/// may be separated by `T` or a space, and seconds may be omitted.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();
    let normalized: Cow<'_, str> = if trimmed.as_bytes().get(10) == Some(&b' ') {
        Cow::Owned(format!("{}T{}", &trimmed[..10], &trimmed[11..]))
    } else {
        Cow::Borrowed(trimmed)
    };
    let value = normalized.as_ref();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.naive_utc());
    }
    if let Ok(with_offset) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Ok(with_offset.naive_utc());
    }
    if let Ok(naive) = value.parse::<NaiveDateTime>() {
        return Ok(naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Ok(naive);
    }
    if let Some(midnight) = value
        .parse::<NaiveDate>()
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight);
    }
    Err(format!("invalid ISO-8601 datetime: `{trimmed}`"))
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_timestamp(&raw))
            .transpose()
            .map_err(de::Error::custom)
    }
}
