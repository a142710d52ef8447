//! Upload endpoints: multipart, inline base64 and fetch-from-URL.

use super::base_url::BaseUrl;
use crate::{
    errors::AppError,
    models::payloads::{Base64UploadReq, RemoteUploadReq, UploadResponse},
    services::gateway::{MultipartUpload, ObjectGateway, UploadedFile},
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
};
use futures::StreamExt;
use std::io;

/// `POST /upload` — multipart form with `file` and optional `folder`, `name`.
///
/// When `folder` and `name` precede `file` the file part is streamed straight
/// into the store. Otherwise it is buffered until the form has been read,
/// since a later field may still change the key.
pub async fn upload_multipart(
    State(gateway): State<ObjectGateway>,
    BaseUrl(base): BaseUrl,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart =
        multipart.map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;

    let mut upload: MultipartUpload<'static> = MultipartUpload::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);

                if upload.folder.is_some() && upload.name.is_some() {
                    let body = field.map(|chunk| chunk.map_err(io::Error::other)).boxed();
                    let streamed = MultipartUpload {
                        folder: upload.folder.take(),
                        name: upload.name.take(),
                        file: Some(UploadedFile {
                            filename,
                            content_type,
                            body,
                        }),
                    };
                    return Ok(Json(gateway.upload_stream(streamed, &base).await?));
                }

                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload.file = Some(UploadedFile::buffered(filename, content_type, bytes));
            }
            "folder" => upload.folder = Some(field.text().await.map_err(multipart_error)?),
            "name" => upload.name = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    Ok(Json(gateway.upload_stream(upload, &base).await?))
}

/// `POST /upload-base64`
pub async fn upload_base64(
    State(gateway): State<ObjectGateway>,
    BaseUrl(base): BaseUrl,
    payload: Result<Json<Base64UploadReq>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(req) = payload.map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
    Ok(Json(gateway.upload_base64(req, &base).await?))
}

/// `POST /upload-url`
pub async fn upload_from_url(
    State(gateway): State<ObjectGateway>,
    BaseUrl(base): BaseUrl,
    payload: Result<Json<RemoteUploadReq>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(req) = payload.map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
    Ok(Json(gateway.upload_from_remote(req, &base).await?))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
