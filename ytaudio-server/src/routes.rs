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
#![allow(clippy::needless_pass_by_value)]
use std::io;

use actix_files::NamedFile;
use actix_web::{get, http::{header::{self, DispositionType}, StatusCode}, post, web, Either, HttpRequest, HttpResponse};
use anyhow::{anyhow, Context};
use chrono::DateTime;
use log::{info, warn};
use serde::Deserialize;
use ytaudio_api::*;
use ytaudio_jobs::{extract_job_id, is_valid_job_id, Admission, Job};

use crate::{built_info, pages, state::*, utils::{self, is_safe_file_name, wants_json}};

const MISSING_URL: &str = "Please enter a YouTube URL";
const QUEUE_FULL: &str = "The server is busy right now. Please try again in a minute.";
const FILE_NOT_FOUND: &str = "File not found. Please try again.";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
       .service(submit)
       .service(progress)
       .service(download)
       .service(about)
       .service(web::scope("/api")
           .service(get_progress)
           .service(get_title)
           .service(get_status)
       );
}

type JsonResult<T> = utils::Result<web::Json<T>>;

#[derive(Deserialize, Default)]
pub struct SubmitForm {
    #[serde(default, alias = "url")]
    pub youtube_url: Option<String>,
}

/// Rejection in the format the submission came in
fn reject(json: bool, status: StatusCode, message: &str) -> HttpResponse {
    if json {
        HttpResponse::build(status).json(ErrorResponse { error: message.to_owned() })
    } else {
        pages::html(status, pages::index(Some(message)))
    }
}

#[get("/")]
async fn index() -> HttpResponse {
    pages::html(StatusCode::OK, pages::index(None))
}

#[post("/")]
async fn submit(body: Either<web::Form<SubmitForm>, web::Json<SubmitForm>>, store: StoreData, queue: QueueData) -> utils::Result<HttpResponse> {
    let (form, json) = match body {
        Either::Left(form) => (form.into_inner(), false),
        Either::Right(json) => (json.into_inner(), true),
    };
    let url = form.youtube_url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Ok(reject(json, StatusCode::BAD_REQUEST, MISSING_URL));
    }

    let job_id = extract_job_id(url);
    match store.begin(&job_id)? {
        Admission::AlreadyRunning => info!("Job {job_id} is already in progress, joining it"),
        Admission::Started => {
            let job = Job { id: job_id.as_str().into(), url: url.to_owned() };
            if let Err(e) = queue.submit(job) {
                warn!("{e}");
                store.withdraw(&job_id, QUEUE_FULL)?;
                return Ok(reject(json, StatusCode::SERVICE_UNAVAILABLE, QUEUE_FULL));
            }
            info!("Queued job {job_id} for {url}");
        },
    }

    let progress_url = format!("/progress/{job_id}");
    if json {
        Ok(HttpResponse::Accepted().json(SubmitResponse { job_id, progress_url }))
    } else {
        Ok(HttpResponse::SeeOther().insert_header((header::LOCATION, progress_url)).finish())
    }
}

#[get("/progress/{job_id}")]
async fn progress(req: HttpRequest, path: web::Path<String>, resolver: ResolverData) -> utils::Result<HttpResponse> {
    let job_id = path.into_inner();
    if wants_json(&req) {
        let title = resolve_title(job_id, &resolver).await?;
        return Ok(HttpResponse::Ok().json(title));
    }
    Ok(pages::html(StatusCode::OK, pages::progress(&job_id)))
}

#[get("/about")]
async fn about() -> HttpResponse {
    pages::html(StatusCode::OK, pages::about(built_info::PKG_VERSION))
}

#[get("/download/{filename}")]
async fn download(path: web::Path<String>, config: web::Data<AppConfig>) -> utils::Result<Either<NamedFile, HttpResponse>> {
    let filename = path.into_inner();
    let not_found = || Either::Right(pages::html(StatusCode::NOT_FOUND, pages::index(Some(FILE_NOT_FOUND))));
    if !is_safe_file_name(&filename) {
        warn!("Refused to serve {filename:?}");
        return Ok(not_found());
    }

    let file_path = config.output_dir.join(&filename);
    let file = match NamedFile::open_async(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(not_found()),
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to open {}", file_path.display())).into()),
    };
    if !file.metadata().is_file() {
        return Ok(not_found());
    }
    let mut disposition = file.content_disposition().clone();
    disposition.disposition = DispositionType::Attachment;
    Ok(Either::Left(file.set_content_disposition(disposition)))
}

#[get("/progress/{job_id}")]
async fn get_progress(path: web::Path<String>, store: StoreData) -> utils::Result<HttpResponse> {
    Ok(match store.get(&path)? {
        Some(record) => HttpResponse::Ok().json(ProgressResponse::from(&record)),
        None => HttpResponse::NotFound().json(NotFoundResponse::download()),
    })
}

#[get("/title/{video_id}")]
async fn get_title(path: web::Path<String>, resolver: ResolverData) -> JsonResult<TitleResponse> {
    Ok(web::Json(resolve_title(path.into_inner(), &resolver).await?))
}

async fn resolve_title(video_id: String, resolver: &ResolverData) -> utils::Result<TitleResponse> {
    if !is_valid_job_id(&video_id) {
        return Err(utils::Error::from(anyhow!("{video_id:?} is not a valid video id")).set_status(StatusCode::BAD_REQUEST));
    }
    let url = format!("https://www.youtube.com/watch?v={video_id}");
    let resolved = resolver.resolve(&url).await
        .with_context(|| format!("Could not resolve the title of {video_id}"))
        .map_err(|e| utils::Error::from(e).set_status(StatusCode::BAD_GATEWAY))?;
    Ok(TitleResponse {
        video_id,
        title: resolved.title,
        strategy: resolved.strategy.to_string(),
    })
}

#[get("/status")]
async fn get_status(store: StoreData, queue: QueueData, config: web::Data<AppConfig>) -> JsonResult<StatusResponse> {
    let counts = store.counts()?;
    Ok(web::Json(StatusResponse {
        active_jobs: counts.active,
        finished_jobs: counts.finished,
        queued_jobs: queue.pending(),
        queue_capacity: queue.capacity(),
        workers: queue.workers(),
        server_version: built_info::PKG_VERSION.into(),
        server_git_hash: built_info::GIT_COMMIT_HASH.map(std::convert::Into::into),
        server_git_dirty: built_info::GIT_DIRTY,
        server_git_commit_timestamp: built_info::GIT_COMMIT_TIMESTAMP.map(std::convert::Into::into),
        server_build_timestamp: DateTime::parse_from_rfc2822(built_info::BUILT_TIME_UTC).ok().map(|t| t.timestamp()),
        server_startup_timestamp: config.startup_timestamp.timestamp(),
    }))
}
