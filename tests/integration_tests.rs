//! Integration tests for frakt-upload
//!
//! Uploads go through the real reqwest transport to a loopback server that
//! records the raw request and answers with a canned response.

use frakt_upload::backend::memory::MemoryTransport;
use frakt_upload::{
    CompressSpec, FilePart, Result, StaticMediaIndex, TargetSize, UploadRequest, UploadResult,
    Uploader,
};
use image::{GenericImageView, ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Recorded {
    head: String,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    fn boundary(&self) -> String {
        self.header("content-type")
            .and_then(|v| v.strip_prefix("multipart/form-data; boundary="))
            .expect("multipart content type")
            .to_string()
    }
}

/// Decode a complete chunked body, or `None` if more bytes are needed.
fn decode_chunked(mut data: &[u8]) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = data.windows(2).position(|w| w == b"\r\n")?;
        let size_text = std::str::from_utf8(&data[..line_end]).ok()?;
        let size = usize::from_str_radix(size_text.split(';').next()?.trim(), 16).ok()?;
        data = &data[line_end + 2..];
        if size == 0 {
            return data.starts_with(b"\r\n").then_some(body);
        }
        if data.len() < size + 2 {
            return None;
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

/// Accept one request, answer with `status_line` and `reply`, and hand back
/// what the client sent.
async fn serve_once(status_line: &'static str, reply: &'static str) -> (String, oneshot::Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 16 * 1024];

        let recorded = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            raw.extend_from_slice(&buf[..n]);

            let Some(split) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&raw[..split]).to_string();
            let rest = &raw[split + 4..];
            let chunked = head.to_ascii_lowercase().contains("transfer-encoding: chunked");

            let body = if chunked {
                decode_chunked(rest)
            } else {
                let length = head
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                (rest.len() >= length).then(|| rest[..length].to_vec())
            };

            if let Some(body) = body {
                break Recorded { head, body };
            }
        };

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        let _ = tx.send(recorded);
    });

    (format!("http://{addr}/upload"), rx)
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 5) as u8, (y * 5) as u8, 128])
    });
    image.save_with_format(&path, ImageFormat::Png).unwrap();
    path
}

/// Bytes of the file part announced with `filename`
fn file_part<'a>(body: &'a [u8], boundary: &str, filename: &str) -> &'a [u8] {
    let header = format!("filename=\"{filename}\"\r\n\r\n");
    let start = body
        .windows(header.len())
        .position(|w| w == header.as_bytes())
        .expect("file part header")
        + header.len();
    let delimiter = format!("\r\n--{boundary}");
    let len = body[start..]
        .windows(delimiter.len())
        .position(|w| w == delimiter.as_bytes())
        .expect("part delimiter");
    &body[start..start + len]
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streams_fields_and_file() -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let doc = tmp.path().join("notes.txt");
    std::fs::write(&doc, b"first line\nsecond line\n")?;

    let (url, recorded) = serve_once("200 OK", "stored\r\nid=42\n").await;
    let uploader = Uploader::builder()
        .user_agent("frakt-upload-integration-test/1.0")
        .build()?;

    let request = UploadRequest::builder(url)
        .header("X-Request-Id", "abc")
        .field("album", "holiday")
        .field("visibility", "private")
        .file(
            FilePart::new(doc.to_string_lossy())
                .name("doc")
                .filename("notes.txt"),
        );

    let result = uploader.upload(request).await;
    assert_eq!(
        result,
        UploadResult::Success {
            status: 200,
            body: "storedid=42".to_string()
        }
    );

    let recorded = recorded.await.unwrap();
    assert!(recorded.head.starts_with("POST /upload HTTP/1.1"));
    assert_eq!(recorded.header("x-request-id"), Some("abc"));
    assert_eq!(recorded.header("user-agent"), Some("frakt-upload-integration-test/1.0"));
    assert!(recorded.header("connection").unwrap().eq_ignore_ascii_case("keep-alive"));

    let b = recorded.boundary();
    let expected = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"album\"\r\n\r\nholiday\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"visibility\"\r\n\r\nprivate\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"notes.txt\"\r\n\r\n\
         first line\nsecond line\n\r\n--{b}--\r\n"
    );
    assert_eq!(String::from_utf8(recorded.body).unwrap(), expected);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_file_is_streamed_intact() -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let path = tmp.path().join("blob.bin");
    let payload: Vec<u8> = (0..3 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &payload)?;

    let (url, recorded) = serve_once("200 OK", "ok").await;
    let uploader = Uploader::builder().chunk_size(256 * 1024).build()?;
    let result = uploader
        .upload(UploadRequest::builder(url).file(FilePart::new(path.to_string_lossy()).filename("blob.bin")))
        .await;
    assert!(result.is_success(), "{result:?}");

    let recorded = recorded.await.unwrap();
    let b = recorded.boundary();
    assert_eq!(file_part(&recorded.body, &b, "blob.bin"), payload.as_slice());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_image_is_resized_to_cover() -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let photo = write_png(tmp.path(), "photo.png", 40, 20);

    let (url, recorded) = serve_once("200 OK", "ok").await;
    let uploader = Uploader::new()?;
    let request = UploadRequest::builder(url).file(
        FilePart::new(photo.to_string_lossy())
            .name("thumb")
            .filename("thumb.png")
            .size(TargetSize::new(10.0, 10.0)?)
            .compress(CompressSpec::png()),
    );
    assert!(uploader.upload(request).await.is_success());

    let recorded = recorded.await.unwrap();
    let b = recorded.boundary();
    let bytes = file_part(&recorded.body, &b, "thumb.png");
    assert_eq!(image::guess_format(bytes).unwrap(), ImageFormat::Png);
    let thumb = image::load_from_memory(bytes).unwrap();
    assert_eq!(thumb.dimensions(), (20, 10));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_200_reports_reason() -> Result<()> {
    let (url, recorded) = serve_once("404 Not Found", "missing").await;
    let uploader = Uploader::new()?;
    let result = uploader.upload(UploadRequest::builder(url).field("a", "b")).await;
    assert_eq!(
        result,
        UploadResult::Failure {
            message: "Error happened: Not Found".to_string()
        }
    );
    recorded.await.unwrap();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let uploader = Uploader::new()?;
    let result = uploader
        .upload(UploadRequest::builder(format!("http://{addr}/upload")).field("a", "b"))
        .await;
    match result {
        UploadResult::Failure { message } => {
            assert!(message.starts_with("Error happened: Connection error"), "{message}")
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_host_options_callback() -> Result<()> {
    let (url, recorded) = serve_once("200 OK", "{\"id\":7}\n").await;
    let uploader = Uploader::new()?;
    let (tx, rx) = oneshot::channel();

    uploader.upload_options(
        serde_json::json!({
            "uploadUrl": url,
            "method": "PUT",
            "headers": { "X-Token": "t" },
            "fields": { "b": "2", "a": "1" }
        }),
        move |error, response| {
            let _ = tx.send((error, response));
        },
    );

    let (error, response) = rx.await.unwrap();
    assert_eq!(error, None);
    assert_eq!(
        response,
        Some(serde_json::json!({ "data": "{\"id\":7}", "status": 200 }))
    );

    let recorded = recorded.await.unwrap();
    assert!(recorded.head.starts_with("PUT /upload"));
    let body = String::from_utf8(recorded.body).unwrap();
    let b_at = body.find("name=\"b\"").unwrap();
    let a_at = body.find("name=\"a\"").unwrap();
    assert!(b_at < a_at);
    Ok(())
}

#[tokio::test]
async fn test_content_uri_resolves_through_media_index() -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let photo = write_png(tmp.path(), "stored.png", 64, 32);

    let mut index = StaticMediaIndex::new();
    index.insert("content://media/external/images/media/9", photo.to_string_lossy());

    let transport = MemoryTransport::respond(200, "ok");
    let uploader = Uploader::builder()
        .transport(transport.clone())
        .media_index(index)
        .build()?;

    let request = UploadRequest::builder("https://example.com/upload").file(
        FilePart::new("content://media/external/images/media/9")
            .filename("small.jpg")
            .compress(CompressSpec::jpeg(0.5)),
    );
    assert!(uploader.upload(request).await.is_success());

    let captured = &transport.requests()[0];
    let boundary = captured
        .header("Content-Type")
        .and_then(|v| v.strip_prefix("multipart/form-data; boundary="))
        .unwrap()
        .to_string();
    let bytes = file_part(&captured.body, &boundary, "small.jpg");
    assert_eq!(image::guess_format(bytes).unwrap(), ImageFormat::Jpeg);
    assert_eq!(image::load_from_memory(bytes).unwrap().dimensions(), (64, 32));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_canonical_status_reports_server_reason() -> Result<()> {
    let (url, recorded) = serve_once("599 Whatever", "").await;
    let uploader = Uploader::new()?;
    let result = uploader.upload(UploadRequest::builder(url).field("a", "b")).await;
    assert_eq!(
        result,
        UploadResult::Failure {
            message: "Error happened: Whatever".to_string()
        }
    );
    recorded.await.unwrap();
    Ok(())
}

#[tokio::test]
async fn test_huge_target_fails_without_allocating() -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let tiny = write_png(tmp.path(), "tiny.png", 2, 2);

    let transport = MemoryTransport::respond(200, "ok");
    let uploader = Uploader::builder().transport(transport.clone()).build()?;
    let request = UploadRequest::builder("https://example.com/upload").file(
        FilePart::new(tiny.to_string_lossy())
            .filename("huge.jpg")
            .size(TargetSize::new(1e10, 1e10)?),
    );

    match uploader.upload(request).await {
        UploadResult::Failure { message } => assert!(
            message.starts_with("Error happened: Failed to decode image"),
            "{message}"
        ),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!transport.requests()[0].finished);
    Ok(())
}
