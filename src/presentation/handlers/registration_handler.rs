use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    domain::{
        error::DomainError,
        models::{
            account::Account,
            credential::PlainPassword,
            phone_number::PhoneNumber,
            registration_session::{RegistrationSession, RegistrationStep, Role, WizardStep},
            step_payloads::{BasicInfo, DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
        },
        services::{
            otp_service::OtpGate, password_service::PasswordHasher, token_service::TokenGenerator,
        },
    },
    presentation::error::{ApiError, ApiResult},
    usecase::{
        registration_finalizer::RegistrationFinalizer,
        registration_state_machine::RegistrationStateMachine,
    },
};

// Request

/// json for starting or resuming a registration
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StartRegistrationRequest {
    #[validate(length(min = 1, max = 32))]
    pub phone_number: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VerifyPhoneRequest {
    #[validate(length(equal = 6))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BasicInfoRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(min = 1, max = 64))]
    pub national_id: String,
    #[validate(url)]
    pub national_id_front_url: String,
    #[validate(url)]
    pub national_id_back_url: String,
    #[validate(length(max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct MerchantInfoRequest {
    #[validate(length(min = 1, max = 200))]
    pub store_name: String,
    #[validate(length(min = 1, max = 100))]
    pub store_category: String,
    #[validate(length(min = 1, max = 500))]
    pub store_address: String,
    #[validate(url)]
    pub store_photo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DriverInfoRequest {
    #[validate(length(min = 1, max = 64))]
    pub license_number: String,
    pub license_expiry: NaiveDate,
    #[validate(url)]
    pub license_photo_url: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VehicleInfoRequest {
    #[validate(length(min = 1, max = 16))]
    pub plate_number: String,
    #[validate(length(min = 1, max = 64))]
    pub make: String,
    #[validate(length(min = 1, max = 64))]
    pub model: String,
    #[validate(length(min = 1, max = 32))]
    pub color: String,
    #[validate(range(min = 1950, max = 2100))]
    pub year: i32,
    #[validate(url)]
    pub vehicle_photo_url: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResidenceInfoRequest {
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub district: String,
    #[validate(length(min = 1, max = 300))]
    pub street_address: String,
    #[validate(length(max = 16))]
    pub postal_code: Option<String>,
}

impl From<MerchantInfoRequest> for MerchantInfo {
    fn from(req: MerchantInfoRequest) -> Self {
        Self {
            store_name: req.store_name,
            store_category: req.store_category,
            store_address: req.store_address,
            store_photo_url: req.store_photo_url,
        }
    }
}

impl From<DriverInfoRequest> for DriverInfo {
    fn from(req: DriverInfoRequest) -> Self {
        Self {
            license_number: req.license_number,
            license_expiry: req.license_expiry,
            license_photo_url: req.license_photo_url,
        }
    }
}

impl From<VehicleInfoRequest> for VehicleInfo {
    fn from(req: VehicleInfoRequest) -> Self {
        Self {
            plate_number: req.plate_number,
            make: req.make,
            model: req.model,
            color: req.color,
            year: req.year,
            vehicle_photo_url: req.vehicle_photo_url,
        }
    }
}

impl From<ResidenceInfoRequest> for ResidenceInfo {
    fn from(req: ResidenceInfoRequest) -> Self {
        Self {
            city: req.city,
            district: req.district,
            street_address: req.street_address,
            postal_code: req.postal_code,
        }
    }
}

// Response

/// json for the current state of a registration
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub phone_number: String,
    pub role: Role,
    pub is_phone_verified: bool,
    pub step: RegistrationStep,
    pub completed_steps: Vec<WizardStep>,
    pub next_step: Option<WizardStep>,
    pub ready_to_finalize: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<RegistrationSession> for SessionResponse {
    fn from(session: RegistrationSession) -> Self {
        let steps = session.role().steps();
        let completed_steps = steps
            .iter()
            .copied()
            .filter(|step| session.has_payload(*step))
            .collect();
        let next_step = steps
            .iter()
            .copied()
            .find(|step| !session.has_payload(*step));

        Self {
            id: session.id().to_string(),
            phone_number: session.phone_number().to_string(),
            role: session.role(),
            is_phone_verified: session.is_phone_verified(),
            step: session.step(),
            completed_steps,
            next_step,
            ready_to_finalize: session.is_ready_to_finalize(),
            updated_at: session.updated_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub phone_number: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountInfo {
    fn from(account: Account) -> Self {
        Self {
            id: account.id().as_uuid().to_string(),
            phone_number: account.phone_number().to_string(),
            full_name: account.full_name().to_string(),
            role: account.role(),
            created_at: account.created_at(),
        }
    }
}

/// json for a finalized registration
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub token: String,
    pub account: AccountInfo,
}

/* Router Function and Handler Function */

/// Registration routes, to be nested under `/api`.
pub fn create_registration_router<O, P, T>(
    state_machine: RegistrationStateMachine<O, P>,
    finalizer: RegistrationFinalizer<T>,
) -> Router
where
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
{
    let state = AppState {
        state_machine: Arc::new(state_machine),
        finalizer: Arc::new(finalizer),
    };

    Router::new()
        .route("/registrations", post(start::<O, P, T>))
        .route("/registrations/{phone}", get(status::<O, P, T>))
        .route(
            "/registrations/{phone}/verification-code",
            post(request_code::<O, P, T>),
        )
        .route("/registrations/{phone}/verify", post(verify::<O, P, T>))
        .route("/registrations/{phone}/basic-info", put(basic_info::<O, P, T>))
        .route(
            "/registrations/{phone}/merchant-info",
            put(merchant_info::<O, P, T>),
        )
        .route("/registrations/{phone}/driver-info", put(driver_info::<O, P, T>))
        .route(
            "/registrations/{phone}/vehicle-info",
            put(vehicle_info::<O, P, T>),
        )
        .route(
            "/registrations/{phone}/residence-info",
            put(residence_info::<O, P, T>),
        )
        .route("/registrations/{phone}/finalize", post(finalize::<O, P, T>))
        .with_state(state)
}

pub struct AppState<O: OtpGate, P: PasswordHasher, T: TokenGenerator> {
    pub state_machine: Arc<RegistrationStateMachine<O, P>>,
    pub finalizer: Arc<RegistrationFinalizer<T>>,
}

impl<O: OtpGate, P: PasswordHasher, T: TokenGenerator> Clone for AppState<O, P, T> {
    fn clone(&self) -> Self {
        Self {
            state_machine: Arc::clone(&self.state_machine),
            finalizer: Arc::clone(&self.finalizer),
        }
    }
}

/// Unwrap a json body and run its field validation.
fn validated<R: Validate>(payload: Result<Json<R>, JsonRejection>) -> ApiResult<R> {
    let Json(request) =
        payload.map_err(|rejection| DomainError::ValidationFailed(rejection.body_text()))?;
    request
        .validate()
        .map_err(|errors| DomainError::ValidationFailed(errors.to_string()))?;
    Ok(request)
}

fn phone_from_path(raw: String) -> Result<PhoneNumber, ApiError> {
    Ok(PhoneNumber::new(raw)?)
}

// handler function

async fn start<O: OtpGate + 'static, P: PasswordHasher + 'static, T: TokenGenerator + 'static>(
    State(state): State<AppState<O, P, T>>,
    payload: Result<Json<StartRegistrationRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let request = validated(payload)?;
    let phone = PhoneNumber::new(request.phone_number)?;
    let session = state
        .state_machine
        .start_or_resume(&phone, request.role)
        .await?;
    Ok(Json(session.into()))
}

async fn status<O: OtpGate + 'static, P: PasswordHasher + 'static, T: TokenGenerator + 'static>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let session = state.state_machine.status(&phone).await?;
    Ok(Json(session.into()))
}

async fn request_code<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
) -> ApiResult<StatusCode> {
    let phone = phone_from_path(phone)?;
    state
        .state_machine
        .request_verification_code(&phone)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn verify<O: OtpGate + 'static, P: PasswordHasher + 'static, T: TokenGenerator + 'static>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<VerifyPhoneRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let session = state
        .state_machine
        .verify_phone(&phone, &request.code)
        .await?;
    Ok(Json(session.into()))
}

async fn basic_info<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<BasicInfoRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let info = BasicInfo {
        full_name: request.full_name,
        national_id: request.national_id,
        national_id_front_url: request.national_id_front_url,
        national_id_back_url: request.national_id_back_url,
    };
    let session = state
        .state_machine
        .set_basic_info(&phone, info, PlainPassword::new(request.password))
        .await?;
    Ok(Json(session.into()))
}

async fn merchant_info<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<MerchantInfoRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let session = state
        .state_machine
        .set_merchant_info(&phone, request.into())
        .await?;
    Ok(Json(session.into()))
}

async fn driver_info<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<DriverInfoRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let session = state
        .state_machine
        .set_driver_info(&phone, request.into())
        .await?;
    Ok(Json(session.into()))
}

async fn vehicle_info<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<VehicleInfoRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let session = state
        .state_machine
        .set_vehicle_info(&phone, request.into())
        .await?;
    Ok(Json(session.into()))
}

async fn residence_info<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
    payload: Result<Json<ResidenceInfoRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let phone = phone_from_path(phone)?;
    let request = validated(payload)?;
    let session = state
        .state_machine
        .set_residence_info(&phone, request.into())
        .await?;
    Ok(Json(session.into()))
}

async fn finalize<
    O: OtpGate + 'static,
    P: PasswordHasher + 'static,
    T: TokenGenerator + 'static,
>(
    State(state): State<AppState<O, P, T>>,
    Path(phone): Path<String>,
) -> ApiResult<(StatusCode, Json<FinalizeResponse>)> {
    let phone = phone_from_path(phone)?;
    let result = state.finalizer.complete(&phone).await?;
    let response = FinalizeResponse {
        token: result.token,
        account: result.account.into(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use rstest::*;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        presentation::error::ErrorBody,
        test_support::{FixedOtpGate, MockPasswordHasher, MockTokenGenerator, VALID_CODE, memory_db},
    };

    const PHONE: &str = "+15551234567";

    #[fixture]
    async fn test_app() -> Router {
        let db = memory_db().await;
        let state_machine =
            RegistrationStateMachine::new(db.clone(), FixedOtpGate::default(), MockPasswordHasher);
        let finalizer = RegistrationFinalizer::new(db, MockTokenGenerator);

        // setup router: same nesting as main
        Router::new().nest("/api", create_registration_router(state_machine, finalizer))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn read<B: serde::de::DeserializeOwned>(response: Response) -> B {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn basic_info_body() -> Value {
        json!({
            "full_name": "Jane Doe",
            "national_id": "A1234567",
            "national_id_front_url": "https://blobs.example.com/id/jane-front.jpg",
            "national_id_back_url": "https://blobs.example.com/id/jane-back.jpg",
            "password": "correct horse",
        })
    }

    async fn started_and_verified(app: &Router, role: &str) {
        let response = send(
            app,
            "POST",
            "/api/registrations",
            Some(json!({ "phone_number": PHONE, "role": role })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            app,
            "POST",
            &format!("/api/registrations/{PHONE}/verify"),
            Some(json!({ "code": VALID_CODE })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[rstest]
    #[tokio::test]
    async fn test_merchant_registration_positive(#[future] test_app: Router) {
        let app = test_app.await;
        started_and_verified(&app, "merchant").await;

        let response = send(
            &app,
            "POST",
            &format!("/api/registrations/{PHONE}/verification-code"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = send(
            &app,
            "PUT",
            &format!("/api/registrations/{PHONE}/basic-info"),
            Some(basic_info_body()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let session: SessionResponse = read(response).await;
        assert_eq!(session.step, RegistrationStep::BasicInfoSet);
        assert_eq!(session.next_step, Some(WizardStep::MerchantInfo));

        let response = send(
            &app,
            "PUT",
            &format!("/api/registrations/{PHONE}/merchant-info"),
            Some(json!({
                "store_name": "Jane's Bakery",
                "store_category": "bakery",
                "store_address": "12 Baker St",
                "store_photo_url": null,
            })),
        )
        .await;
        let session: SessionResponse = read(response).await;
        assert!(session.ready_to_finalize);

        let response = send(
            &app,
            "POST",
            &format!("/api/registrations/{PHONE}/finalize"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let finalized: FinalizeResponse = read(response).await;
        assert_eq!(finalized.token, "mock_token");
        assert_eq!(finalized.account.phone_number, PHONE);
        assert_eq!(finalized.account.role, Role::Merchant);

        let response = send(&app, "GET", &format!("/api/registrations/{PHONE}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn test_skipped_step_negative(#[future] test_app: Router) {
        let app = test_app.await;
        started_and_verified(&app, "driver").await;

        let response = send(
            &app,
            "PUT",
            &format!("/api/registrations/{PHONE}/vehicle-info"),
            Some(json!({
                "plate_number": "7ABC123",
                "make": "Toyota",
                "model": "Corolla",
                "color": "white",
                "year": 2021,
                "vehicle_photo_url": "https://blobs.example.com/vehicle/corolla.jpg",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "STEP_OUT_OF_ORDER");
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_body_negative(#[future] test_app: Router) {
        let app = test_app.await;
        started_and_verified(&app, "driver").await;

        let mut body = basic_info_body();
        body["national_id_front_url"] = json!("not a url");
        let response = send(
            &app,
            "PUT",
            &format!("/api/registrations/{PHONE}/basic-info"),
            Some(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "VALIDATION_FAILED");

        let response = send(
            &app,
            "POST",
            "/api/registrations",
            Some(json!({ "phone_number": PHONE, "role": "pilot" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_phone_negative(#[future] test_app: Router) {
        let app = test_app.await;
        let response = send(
            &app,
            "POST",
            "/api/registrations",
            Some(json!({ "phone_number": "5551234", "role": "driver" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "INVALID_PHONE_NUMBER");
    }

    #[rstest]
    #[tokio::test]
    async fn test_role_conflict_negative(#[future] test_app: Router) {
        let app = test_app.await;
        started_and_verified(&app, "driver").await;

        let response = send(
            &app,
            "POST",
            "/api/registrations",
            Some(json!({ "phone_number": PHONE, "role": "merchant" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "ROLE_CONFLICT");
    }

    #[rstest]
    #[tokio::test]
    async fn test_finalize_incomplete_negative(#[future] test_app: Router) {
        let app = test_app.await;
        started_and_verified(&app, "driver").await;

        let response = send(
            &app,
            "POST",
            &format!("/api/registrations/{PHONE}/finalize"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "REGISTRATION_INCOMPLETE");
    }

    #[rstest]
    #[tokio::test]
    async fn test_status_unknown_negative(#[future] test_app: Router) {
        let app = test_app.await;
        let response = send(&app, "GET", "/api/registrations/+15550000000", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorBody = read(response).await;
        assert_eq!(error.code, "SESSION_NOT_FOUND");
    }
}
