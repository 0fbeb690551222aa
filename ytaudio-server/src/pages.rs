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
use actix_web::{http::{header::ContentType, StatusCode}, HttpResponse};

pub fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .insert_header(ContentType::html())
        .body(body)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, content: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - YT Audio</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header>
        <a class="brand" href="/">YT Audio</a>
        <nav><a href="/">Convert</a> <a href="/about">About</a></nav>
    </header>
    <main>
{content}
    </main>
</body>
</html>
"#, title = escape(title))
}

/// The submission form, optionally with an error message above it
pub fn index(error: Option<&str>) -> String {
    let error = error
        .map(|message| format!(r#"        <p class="error">{}</p>"#, escape(message)))
        .unwrap_or_default();
    layout("Convert", &format!(r#"        <h1>YouTube to audio</h1>
{error}
        <form method="post" action="/">
            <label for="youtube_url">Video URL</label>
            <input type="url" id="youtube_url" name="youtube_url" placeholder="https://www.youtube.com/watch?v=..." required autofocus>
            <button type="submit">Convert</button>
        </form>"#))
}

pub fn progress(job_id: &str) -> String {
    let job_id = escape(job_id);
    layout("Progress", &format!(r#"        <h1>Converting</h1>
        <section id="job" data-job-id="{job_id}">
            <p id="job-title">Waiting for the video title...</p>
            <progress id="job-progress" max="100" value="0"></progress>
            <p id="job-status">starting</p>
            <p id="job-error" class="error" hidden></p>
            <a id="job-download" class="button" hidden>Download</a>
        </section>
        <script src="/static/progress.js"></script>"#))
}

pub fn about(version: &str) -> String {
    layout("About", &format!(r#"        <h1>About</h1>
        <p>YT Audio converts YouTube videos to audio files using <a href="https://github.com/yt-dlp/yt-dlp">yt-dlp</a>.</p>
        <p>Conversion progress is only tracked for a limited time after a job finishes. Download your file as soon as it is ready.</p>
        <p>Version {}</p>"#, escape(version)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_is_escaped() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
        let page = index(Some("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!page.contains("<script>alert"));
    }

    #[test]
    fn about_page_describes_retention() {
        let page = about("1.2.3");
        assert!(page.contains("Conversion progress is only tracked for a limited time"));
        assert!(!page.contains("files are kept"));
        assert!(page.contains("Version 1.2.3"));
    }
}
