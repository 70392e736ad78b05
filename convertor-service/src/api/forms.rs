//! Form body extraction shared by the transform endpoints.
//!
//! Accepts `multipart/form-data` and `application/x-www-form-urlencoded`.
//! Any other body (or none) yields an empty form, so missing fields surface
//! as the endpoint's own 400 message.

use std::collections::HashMap;

use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::error::ErrorResponse;
use crate::service::Upload;

/// Files and text fields of a submitted form
#[derive(Debug, Default)]
pub struct FormData {
    files: HashMap<String, Upload>,
    fields: HashMap<String, Vec<String>>,
}

impl FormData {
    /// Take the uploaded file sent under `name`
    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    /// First value of a text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value sent for a text field, in order
    pub fn field_values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn reject(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut form = FormData::default();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| reject(e.status(), e.body_text()))?;

            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| reject(e.status(), e.body_text()))?
            {
                let name = field.name().unwrap_or("").to_string();

                if let Some(file_name) = field.file_name().map(str::to_string) {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| reject(e.status(), e.body_text()))?;
                    form.files.insert(
                        name,
                        Upload {
                            file_name,
                            content_type,
                            data,
                        },
                    );
                } else {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| reject(e.status(), e.body_text()))?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| reject(e.status(), e.body_text()))?;
            for (name, value) in pairs {
                form.fields.entry(name).or_default().push(value);
            }
        }

        Ok(form)
    }
}
