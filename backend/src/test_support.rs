use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::{Server, ServerHandle};
use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tch::{Device, Kind, Tensor};
use uuid::Uuid;

use crate::classifier::inference::Classifier;
use crate::classifier::provisioner::LoadedModel;
use crate::classifier::{ClassifyError, RawImage};

pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("sneaker-auth-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn solid_rgb(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

pub fn solid_image(width: u32, height: u32, value: u8) -> RawImage {
    RawImage::from_rgb(solid_rgb(width, height, value))
}

/// Checkerboard of two gray levels: mean is their midpoint, standard
/// deviation half their distance (for an even pixel count).
pub fn two_tone_image(width: u32, height: u32, dark: u8, light: u8) -> RawImage {
    RawImage::from_rgb(RgbImage::from_fn(width, height, |x, y| {
        let v = if (x + y) % 2 == 0 { dark } else { light };
        Rgb([v, v, v])
    }))
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Returns the same logits for every batch.
pub struct FixedLogits(pub Vec<f32>);

impl Classifier for FixedLogits {
    fn logits(&self, _batch: &Tensor) -> Result<Tensor, ClassifyError> {
        let len = self.0.len() as i64;
        Ok(Tensor::f_from_slice(&self.0)?.f_view([1, len])?)
    }
}

/// Logits `[-m, m]` where `m` is the batch mean, so every input gets its own answer.
pub struct MeanLogits;

impl Classifier for MeanLogits {
    fn logits(&self, batch: &Tensor) -> Result<Tensor, ClassifyError> {
        let mean = batch.f_mean(Kind::Float)?.f_double_value(&[])? as f32;
        Ok(Tensor::f_from_slice(&[-mean, mean])?.f_view([1, 2])?)
    }
}

pub fn loaded_model<C: Classifier + 'static>(classifier: C) -> Arc<LoadedModel> {
    Arc::new(LoadedModel::new(
        Box::new(classifier),
        PathBuf::from("test.safetensors"),
        Device::Cpu,
    ))
}

pub fn multipart_body(boundary: &str, field: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Minimal HTTP server answering one path, for download tests.
pub struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

pub fn serve_bytes(path: &'static str, status: u16, content_type: &'static str, body: Vec<u8>) -> TestServer {
    let server = HttpServer::new(move || {
        let body = body.clone();
        App::new().route(
            path,
            web::get().to(move || {
                let body = body.clone();
                async move {
                    HttpResponse::build(StatusCode::from_u16(status).unwrap())
                        .content_type(content_type)
                        .body(body)
                }
            }),
        )
    })
    .workers(1)
    .shutdown_timeout(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    spawn(server.run(), addr)
}

/// Accepts the request but answers only after `delay`.
pub fn serve_stalled(path: &'static str, delay: Duration) -> TestServer {
    let server = HttpServer::new(move || {
        App::new().route(
            path,
            web::get().to(move || async move {
                actix_web::rt::time::sleep(delay).await;
                HttpResponse::Ok().body("late")
            }),
        )
    })
    .workers(1)
    .shutdown_timeout(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    spawn(server.run(), addr)
}

fn spawn(running: Server, addr: SocketAddr) -> TestServer {
    let handle = running.handle();
    actix_web::rt::spawn(running);
    TestServer { addr, handle }
}
