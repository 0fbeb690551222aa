/* This file is part of the YT Audio project - https://github.com/mini-bomba/ytaudio
*
*  Copyright (C) 2025 mini_bomba
*  
*  This program is free software: you can redistribute it and/or modify
*  it under the terms of the GNU Affero General Public License as published by
*  the Free Software Foundation, either version 3 of the License, or
*  (at your option) any later version.
*
*  This program is distributed in the hope that it will be useful,
*  but WITHOUT ANY WARRANTY; without even the implied warranty of
*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
*  GNU Affero General Public License for more details.
*
*  You should have received a copy of the GNU Affero General Public License
*  along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
use std::fmt::{Debug, Display};

use actix_web::{http::{header, StatusCode}, HttpRequest, HttpResponse, ResponseError};
use ytaudio_api::ErrorResponse;


pub enum Error {
    Anyhow(anyhow::Error, StatusCode),
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Error::Anyhow(err, _) = self;
        Debug::fmt(err, f)
    }
}
impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Error::Anyhow(err, _) = self;
        Display::fmt(err, f)
    }
}
impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value, StatusCode::INTERNAL_SERVER_ERROR)
    }
}
impl std::error::Error for Error {}
impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        let Error::Anyhow(_, status) = self;
        *status
    }

    fn error_response(&self) -> HttpResponse {
        let Error::Anyhow(err, status) = self;
        HttpResponse::build(*status).json(ErrorResponse { error: format!("{err:#}") })
    }
}

impl Error {
    pub fn set_status(self, status: StatusCode) -> Self {
        let Error::Anyhow(err, _) = self;
        Error::Anyhow(err, status)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether the client listed `application/json` in its `Accept` header
pub fn wants_json(req: &HttpRequest) -> bool {
    req.headers()
        .get_all(header::ACCEPT)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media| media.split(';').next().is_some_and(|m| m.trim().eq_ignore_ascii_case("application/json")))
}

/// A plain file name inside the output directory: no separators, no hidden or relative names
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use actix_web::{body::to_bytes, test::TestRequest};
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn accept_negotiation() {
        let req = TestRequest::default().insert_header((header::ACCEPT, "text/html, application/json;q=0.9")).to_http_request();
        assert!(wants_json(&req));
        let req = TestRequest::default().insert_header((header::ACCEPT, "text/html,*/*;q=0.8")).to_http_request();
        assert!(!wants_json(&req));
        assert!(!wants_json(&TestRequest::default().to_http_request()));
    }

    #[actix_web::test]
    async fn errors_render_as_json_with_their_status() {
        let err = Error::from(anyhow!("Job abc is gone").context("Failed to look up the job"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = err.set_status(StatusCode::BAD_GATEWAY);
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Failed to look up the job: Job abc is gone");
    }

    #[test]
    fn file_names() {
        assert!(is_safe_file_name("My Song.mp3"));
        assert!(is_safe_file_name("My Song (1).mp3"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name(".hidden.mp3"));
        assert!(!is_safe_file_name("../config.toml"));
        assert!(!is_safe_file_name("dir\\file.mp3"));
    }
}
