use actix_web::{HttpRequest, HttpResponse, Responder, web};
use log::info;
use serde_json::json;

use crate::error::{ApiError, StoreResult};
use crate::models::{AppointmentCreate, AppointmentUpdate, PatientCreate, PatientUpdate};
use crate::storage::{Page, Storage};

pub const WELCOME_MESSAGE: &str = "Welcome to Patients & Appointments API.";

type HandlerResult = Result<HttpResponse, ApiError>;

// Runs a storage operation on the blocking pool so SQLite I/O never stalls a worker.
async fn run_blocking<T, F>(storage: web::Data<Storage>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Storage) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let result = web::block(move || op(storage.get_ref())).await?;
    Ok(result?)
}

// Handler for the welcome message
pub async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({ "msg": WELCOME_MESSAGE }))
}

// Fallback for unknown routes
pub async fn not_found(req: HttpRequest) -> impl Responder {
    info!("no route for {} {}", req.method(), req.path());
    HttpResponse::NotFound().json(json!({ "detail": "Not Found" }))
}

// Patients

// Handler to create a new patient
pub async fn create_patient(
    storage: web::Data<Storage>,
    body: web::Json<PatientCreate>,
) -> HandlerResult {
    let input = body.into_inner();
    let patient = run_blocking(storage, move |s| s.create_patient(&input)).await?;
    info!("created patient {}", patient.id);
    Ok(HttpResponse::Created().json(patient))
}

// Handler to list patients with skip/limit
pub async fn list_patients(storage: web::Data<Storage>, page: web::Query<Page>) -> HandlerResult {
    let page = page.into_inner();
    let patients = run_blocking(storage, move |s| s.list_patients(page)).await?;
    Ok(HttpResponse::Ok().json(patients))
}

// Handler to get a patient by ID
pub async fn get_patient(storage: web::Data<Storage>, patient_id: web::Path<i64>) -> HandlerResult {
    let id = patient_id.into_inner();
    let patient = run_blocking(storage, move |s| s.get_patient(id)).await?;
    Ok(HttpResponse::Ok().json(patient))
}

pub async fn update_patient(
    storage: web::Data<Storage>,
    patient_id: web::Path<i64>,
    body: web::Json<PatientUpdate>,
) -> HandlerResult {
    let id = patient_id.into_inner();
    let changes = body.into_inner();
    let patient = run_blocking(storage, move |s| s.update_patient(id, &changes)).await?;
    info!("updated patient {id}");
    Ok(HttpResponse::Ok().json(patient))
}

// Handler to delete a patient together with their appointments
pub async fn delete_patient(
    storage: web::Data<Storage>,
    patient_id: web::Path<i64>,
) -> HandlerResult {
    let id = patient_id.into_inner();
    run_blocking(storage, move |s| s.delete_patient(id)).await?;
    info!("deleted patient {id} and its appointments");
    Ok(HttpResponse::NoContent().finish())
}

// Appointments

// Handler to book an appointment for an existing patient
pub async fn create_appointment(
    storage: web::Data<Storage>,
    body: web::Json<AppointmentCreate>,
) -> HandlerResult {
    let input = body.into_inner();
    let appointment = run_blocking(storage, move |s| s.create_appointment(&input)).await?;
    info!(
        "created appointment {} for patient {}",
        appointment.id, appointment.patient_id
    );
    Ok(HttpResponse::Created().json(appointment))
}

pub async fn list_appointments(
    storage: web::Data<Storage>,
    page: web::Query<Page>,
) -> HandlerResult {
    let page = page.into_inner();
    let appointments = run_blocking(storage, move |s| s.list_appointments(page)).await?;
    Ok(HttpResponse::Ok().json(appointments))
}

pub async fn get_appointment(
    storage: web::Data<Storage>,
    appointment_id: web::Path<i64>,
) -> HandlerResult {
    let id = appointment_id.into_inner();
    let appointment = run_blocking(storage, move |s| s.get_appointment(id)).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

// Handler to reschedule or annotate an appointment
pub async fn update_appointment(
    storage: web::Data<Storage>,
    appointment_id: web::Path<i64>,
    body: web::Json<AppointmentUpdate>,
) -> HandlerResult {
    let id = appointment_id.into_inner();
    let changes = body.into_inner();
    let appointment = run_blocking(storage, move |s| s.update_appointment(id, &changes)).await?;
    info!("updated appointment {id}");
    Ok(HttpResponse::Ok().json(appointment))
}

pub async fn delete_appointment(
    storage: web::Data<Storage>,
    appointment_id: web::Path<i64>,
) -> HandlerResult {
    let id = appointment_id.into_inner();
    run_blocking(storage, move |s| s.delete_appointment(id)).await?;
    info!("deleted appointment {id}");
    Ok(HttpResponse::NoContent().finish())
}
