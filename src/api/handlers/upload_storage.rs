use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadError;
use crate::services::transport::RequestUploads;
use crate::services::upload_facade::UploadFacade;
use crate::services::upload_store::UploadStore;
use crate::utils::validation::{FormData, Rule, Validation};
use axum::{
    extract::{Multipart, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

pub const FORM_PATH: &str = "/upload-storage/test";
pub const FILE_FIELD: &str = "file";
pub const VALIDATE_FIELD: &str = "validate";

/// Multipart body accepted by the test form
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Option<String>,
    /// Checkbox; any non-blank value counts as checked
    validate: Option<String>,
}

/// Plain (non-file) fields of the test form
#[derive(Debug, Default, Validate)]
struct FormFields {
    #[validate(custom(function = "checkbox_ticked"))]
    validate: String,
}

impl FormFields {
    fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            validate: fields.get(VALIDATE_FIELD).cloned().unwrap_or_default(),
        }
    }
}

fn checkbox_ticked(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(Rule::NotEmpty.error(VALIDATE_FIELD));
    }
    Ok(())
}

struct SessionId {
    id: String,
    is_new: bool,
}

impl SessionId {
    fn from_jar(jar: &CookieJar, cookie_name: &str) -> Self {
        let existing = jar
            .get(cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| Uuid::parse_str(value).is_ok());

        match existing {
            Some(id) => Self { id, is_new: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                is_new: true,
            },
        }
    }

    /// Adds the session cookie to `jar` when the session was just created.
    fn persist(&self, jar: CookieJar, cookie_name: &str) -> CookieJar {
        if !self.is_new {
            return jar;
        }

        let cookie = Cookie::build((cookie_name.to_string(), self.id.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        jar.add(cookie)
    }
}

async fn attach(
    state: &AppState,
    session: &SessionId,
    uploads: RequestUploads,
) -> Result<UploadFacade, AppError> {
    let store = UploadStore::new(state.sessions.clone(), session.id.clone());
    Ok(UploadFacade::attach(store, uploads, state.file_ops.clone()).await?)
}

/// Splits a multipart body into spooled uploads and plain fields.
async fn read_form(
    mut multipart: Multipart,
    state: &AppState,
) -> Result<(RequestUploads, HashMap<String, String>), AppError> {
    let mut uploads = RequestUploads::new(state.config.resolved_temp_dir());
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.insert(name, text);
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Upload for field {} cut short: {}", name, e);
                uploads.reject(&name, &file_name, content_type.as_deref(), UploadError::Partial);
                break;
            }
        };

        // Browsers send an empty part when the picker is left blank
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }

        if bytes.len() > state.config.max_file_size {
            uploads.reject(&name, &file_name, content_type.as_deref(), UploadError::FormSize);
            continue;
        }

        if let Err(e) = uploads
            .receive(&name, &file_name, content_type.as_deref(), &bytes)
            .await
        {
            tracing::error!("Failed to spool upload for field {}: {}", name, e);
            uploads.reject(&name, &file_name, content_type.as_deref(), UploadError::CantWrite);
        }
    }

    Ok((uploads, fields))
}

#[utoipa::path(
    get,
    path = "/upload-storage/test",
    responses(
        (status = 200, description = "Upload form", content_type = "text/html", body = String)
    ),
    tag = "upload-storage"
)]
pub async fn show_form(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), AppError> {
    let cookie_name = &state.config.session_cookie;
    let session = SessionId::from_jar(&jar, cookie_name);
    let uploads = RequestUploads::new(state.config.resolved_temp_dir());
    let facade = attach(&state, &session, uploads).await?;

    let page = render_form(&facade, None);
    Ok((session.persist(jar, cookie_name), page.into_response()))
}

#[utoipa::path(
    post,
    path = "/upload-storage/test",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 303, description = "Form accepted, stored upload released"),
        (status = 200, description = "Validation failed, form re-rendered", content_type = "text/html", body = String),
        (status = 500, description = "Upload could not be stored")
    ),
    tag = "upload-storage"
)]
pub async fn submit_form(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(CookieJar, Response), AppError> {
    let cookie_name = &state.config.session_cookie;
    let session = SessionId::from_jar(&jar, cookie_name);
    let (uploads, fields) = read_form(multipart, &state).await?;
    let mut facade = attach(&state, &session, uploads).await?;

    let form_fields = FormFields::from_fields(&fields);
    let data = FormData::new(facade.all(), fields);
    let validation = Validation::new()
        .rule(FILE_FIELD, Rule::NotEmpty)
        .rule(FILE_FIELD, Rule::UploadNotEmpty)
        .rule(FILE_FIELD, Rule::UploadValid)
        .rule(FILE_FIELD, Rule::UploadSize(state.config.max_file_size as u64));

    let response = match validation.check_after(form_fields.validate(), &data, &facade) {
        Ok(()) => {
            facade.delete(&[FILE_FIELD]).await?;
            tracing::info!("Form accepted for session {}", session.id);
            Redirect::to(FORM_PATH).into_response()
        }
        Err(errors) => {
            // Keep the file unless the file itself is what failed
            if !errors.field_errors().contains_key(FILE_FIELD) {
                facade.store(FILE_FIELD).await?;
            }
            tracing::info!("Form rejected for session {}: {}", session.id, errors);
            render_form(&facade, Some(&errors)).into_response()
        }
    };

    Ok((session.persist(jar, cookie_name), response))
}

fn render_form(facade: &UploadFacade, errors: Option<&ValidationErrors>) -> Html<String> {
    // Name what the session holds, not a re-selected file that was refused
    let file_control = match facade.stored_descriptor(FILE_FIELD) {
        Some(stored) => format!("Already stored ({})", escape_html(&stored.original_name)),
        None => format!(r#"<input type="file" name="{0}" id="{0}" />"#, FILE_FIELD),
    };

    let error_list = errors
        .filter(|e| !e.is_empty())
        .map(|errors| {
            let mut by_field: Vec<_> = errors.field_errors().into_iter().collect();
            by_field.sort_by(|(a, _), (b, _)| a.cmp(b));
            let items: String = by_field
                .iter()
                .flat_map(|(_, errs)| errs.iter())
                .map(|e| format!("<li>{}</li>", escape_html(&e.to_string())))
                .collect();
            format!(r#"<ul class="errors">{}</ul>"#, items)
        })
        .unwrap_or_default();

    Html(format!(
        r#"<html>
	<head>
		<title>Upload Storage test</title>
	</head>
	<body>
		<form method="post" action="{path}" enctype="multipart/form-data">
			{error_list}
			<label for="{file}">File</label>
			{file_control}
			<hr />
			<input type="checkbox" name="{validate}" value="1" id="{validate}" />
			<label for="{validate}">Validate and remove storage</label>
			<hr />
			<button type="submit" name="submit">Submit</button>
		</form>
	</body>
</html>
"#,
        path = FORM_PATH,
        file = FILE_FIELD,
        validate = VALIDATE_FIELD,
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
