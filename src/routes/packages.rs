use crate::error::ApiError;
use crate::models::{AuthenticatedUser, NpmPublishRequest, NpmPublishResponse, OkResponse};
use crate::services::RegistryService;
use crate::state::AppState;
use log::debug;
use percent_encoding::percent_decode_str;
use rocket::http::{ContentType, Status};
use rocket::request::{FromParam, FromRequest, Outcome, Request};
use rocket::response::{Responder, Response};
use rocket::serde::json::{Json, Value};
use rocket::{State, delete, get, put};
use std::io::Cursor;

/// Address clients should use to reach this registry.
pub struct BaseUrl(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BaseUrl {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = request.rocket().state::<AppState>() else {
            return Outcome::Error((
                Status::InternalServerError,
                ApiError::InternalServerError("Application state unavailable".to_string()),
            ));
        };
        let config = &state.config;

        if let Some(base) = config.base_url.as_deref().filter(|b| !b.is_empty()) {
            return Outcome::Success(BaseUrl(base.trim_end_matches('/').to_string()));
        }

        let host = request
            .headers()
            .get_one("Host")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}:{}", config.host, config.port));
        Outcome::Success(BaseUrl(format!("{}://{host}", config.get_scheme())))
    }
}

// JSON or raw bytes, depending on what was requested
#[derive(Debug)]
pub enum PackageResponse {
    Json(Value),
    Binary(Vec<u8>),
}

impl<'r> Responder<'r, 'static> for PackageResponse {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            PackageResponse::Json(json) => {
                let body = json.to_string();
                Response::build()
                    .header(ContentType::JSON)
                    .sized_body(body.len(), Cursor::new(body))
                    .ok()
            }
            PackageResponse::Binary(data) => Response::build()
                .header(ContentType::Binary)
                .sized_body(data.len(), Cursor::new(data))
                .ok(),
        }
    }
}

// Matches only the `@scope` segment of a scoped package name
pub struct ScopedPackageName(pub String);

impl<'r> FromParam<'r> for ScopedPackageName {
    type Error = &'r str;

    fn from_param(param: &'r str) -> Result<Self, Self::Error> {
        if param.starts_with('@') {
            Ok(ScopedPackageName(param.to_string()))
        } else {
            Err(param)
        }
    }
}

/// Undoes client-side encoding such as `@types%2fnode`.
pub fn package_name(raw: &str) -> Result<String, ApiError> {
    let name = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ApiError::BadRequest(format!("package name '{raw}' is not valid UTF-8")))?
        .into_owned();

    if name.starts_with('@') && !name.contains('/') {
        return Err(ApiError::BadRequest(format!("invalid scoped package name '{name}'")));
    }
    Ok(name)
}

fn scoped_name(scope: ScopedPackageName, package: &str) -> Result<String, ApiError> {
    package_name(&format!("{}/{package}", scope.0))
}

fn decoded_filename(raw: &str) -> Result<String, ApiError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|name| name.into_owned())
        .map_err(|_| ApiError::BadRequest(format!("filename '{raw}' is not valid UTF-8")))
}

async fn metadata(name: &str, base: BaseUrl, state: &AppState) -> Result<PackageResponse, ApiError> {
    debug!("Metadata request for {name}");
    let metadata = RegistryService::get_package_metadata(name, &base.0, state).await?;
    Ok(PackageResponse::Json(metadata))
}

async fn tarball(name: &str, filename: &str, state: &AppState) -> Result<PackageResponse, ApiError> {
    debug!("Tarball request for {name}/-/{filename}");
    let filename = decoded_filename(filename)?;
    let data = RegistryService::get_package_tarball(name, &filename, state).await?;
    Ok(PackageResponse::Binary(data))
}

async fn publish(
    name: &str,
    request: Json<NpmPublishRequest>,
    user: AuthenticatedUser,
    state: &AppState,
) -> Result<(Status, Json<NpmPublishResponse>), ApiError> {
    let response = state.publisher.publish(name, request.into_inner(), &user).await?;
    Ok((Status::Created, Json(response)))
}

async fn unpublish(
    name: &str,
    filename: Option<&str>,
    user: AuthenticatedUser,
    state: &AppState,
) -> Result<Json<OkResponse>, ApiError> {
    let filename = filename.map(decoded_filename).transpose()?;
    state.publisher.unpublish(name, filename.as_deref(), &user).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[get("/<scope>/<package>", rank = 1)]
pub async fn scoped_metadata(
    scope: ScopedPackageName,
    package: &str,
    base: BaseUrl,
    state: &State<AppState>,
) -> Result<PackageResponse, ApiError> {
    metadata(&scoped_name(scope, package)?, base, state).await
}

#[get("/<package>", rank = 2)]
pub async fn regular_metadata(
    package: &str,
    base: BaseUrl,
    state: &State<AppState>,
) -> Result<PackageResponse, ApiError> {
    metadata(&package_name(package)?, base, state).await
}

#[get("/<scope>/<package>/-/<filename>", rank = 1)]
pub async fn scoped_tarball(
    scope: ScopedPackageName,
    package: &str,
    filename: &str,
    state: &State<AppState>,
) -> Result<PackageResponse, ApiError> {
    tarball(&scoped_name(scope, package)?, filename, state).await
}

#[get("/<package>/-/<filename>", rank = 2)]
pub async fn regular_tarball(
    package: &str,
    filename: &str,
    state: &State<AppState>,
) -> Result<PackageResponse, ApiError> {
    tarball(&package_name(package)?, filename, state).await
}

#[put("/<scope>/<package>", data = "<request>", rank = 1)]
pub async fn scoped_publish(
    scope: ScopedPackageName,
    package: &str,
    request: Json<NpmPublishRequest>,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<(Status, Json<NpmPublishResponse>), ApiError> {
    publish(&scoped_name(scope, package)?, request, user, state).await
}

#[put("/<package>", data = "<request>", rank = 2)]
pub async fn regular_publish(
    package: &str,
    request: Json<NpmPublishRequest>,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<(Status, Json<NpmPublishResponse>), ApiError> {
    publish(&package_name(package)?, request, user, state).await
}

#[delete("/<scope>/<package>", rank = 1)]
pub async fn scoped_unpublish(
    scope: ScopedPackageName,
    package: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&scoped_name(scope, package)?, None, user, state).await
}

#[delete("/<package>", rank = 2)]
pub async fn regular_unpublish(
    package: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&package_name(package)?, None, user, state).await
}

// npm unpublish sends the document revision: DELETE /<package>/-rev/<rev>
#[delete("/<scope>/<package>/-rev/<_rev>", rank = 1)]
pub async fn scoped_unpublish_rev(
    scope: ScopedPackageName,
    package: &str,
    _rev: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&scoped_name(scope, package)?, None, user, state).await
}

#[delete("/<package>/-rev/<_rev>", rank = 2)]
pub async fn regular_unpublish_rev(
    package: &str,
    _rev: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&package_name(package)?, None, user, state).await
}

#[delete("/<scope>/<package>/-/<filename>", rank = 1)]
pub async fn scoped_unpublish_tarball(
    scope: ScopedPackageName,
    package: &str,
    filename: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&scoped_name(scope, package)?, Some(filename), user, state).await
}

#[delete("/<package>/-/<filename>", rank = 2)]
pub async fn regular_unpublish_tarball(
    package: &str,
    filename: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    unpublish(&package_name(package)?, Some(filename), user, state).await
}
