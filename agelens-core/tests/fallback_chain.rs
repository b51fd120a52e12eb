use std::{path::PathBuf, sync::Arc, time::Duration};

use agelens_core::{
    AgeGender, ChainSettings, DetectOptions, DetectionFallbackChain, DetectionSource, FaceAnalyzer,
    FaceBox, FaceStack, HttpRemoteEstimator, ImageFrame, NaturalSpace, Rect,
};
use agelens_utils::config::AppSettings;
use image::{Rgb, RgbImage};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// A detector that never finds anything.
struct Blind;

impl FaceAnalyzer for Blind {
    fn detect(&self, _: &RgbImage, _: &DetectOptions) -> anyhow::Result<Vec<FaceBox>> {
        Ok(Vec::new())
    }

    fn age_gender(&self, _: &RgbImage) -> anyhow::Result<Option<AgeGender>> {
        Ok(None)
    }
}

/// Read headers and a `Content-Length` body so the connection closes cleanly.
async fn drain_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    while let Ok(n) = socket.read(&mut chunk).await {
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        let Some(split) = text.find("\r\n\r\n") else {
            continue;
        };
        let length = text[..split]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= split + 4 + length {
            return;
        }
    }
}

fn frame() -> ImageFrame {
    ImageFrame::new(RgbImage::from_pixel(200, 150, Rgb([120, 90, 60])))
}

fn selection() -> Rect<NaturalSpace> {
    Rect::new(40.0, 30.0, 80.0, 90.0)
}

#[tokio::test]
async fn blind_detector_falls_back_to_http_estimate() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/analyze-face", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let body =
            r#"{"results":[{"age":36,"gender":"female","genderProbability":0.77}],"isEstimate":true}"#;
        drain_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    });

    let remote = HttpRemoteEstimator::new(url, Duration::from_secs(5)).unwrap();
    let chain =
        DetectionFallbackChain::new(Arc::new(Blind), Some(remote), ChainSettings::default());

    let result = chain.analyze(&frame(), Some(selection())).await.unwrap();
    assert_eq!(result.len(), 1);
    let record = &result.records[0];
    assert_eq!(record.source, DetectionSource::RemoteEstimate);
    assert_eq!(record.age, 36.0);
    assert_eq!(record.bbox, selection());
    assert!(record.is_estimate);
}

#[tokio::test]
async fn unreachable_remote_still_yields_one_record() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote =
        HttpRemoteEstimator::new(format!("http://{addr}/"), Duration::from_secs(1)).unwrap();
    let chain =
        DetectionFallbackChain::new(Arc::new(Blind), Some(remote), ChainSettings::default());

    let result = chain.analyze(&frame(), Some(selection())).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.records[0].source, DetectionSource::ManualFallback);
    assert_eq!(result.records[0].confidence, 0.5);
}

#[tokio::test(start_paused = true)]
async fn hanging_remote_is_cut_off_by_chain_timeout() {
    struct Hanging;
    impl agelens_core::RemoteEstimator for Hanging {
        async fn estimate(
            &self,
            _jpeg: Vec<u8>,
        ) -> Result<Vec<agelens_core::RemoteEstimate>, agelens_core::RemoteEstimateError> {
            std::future::pending().await
        }
    }

    let settings = ChainSettings {
        remote_timeout: Duration::from_millis(300),
        ..ChainSettings::default()
    };
    let chain = DetectionFallbackChain::new(Arc::new(Blind), Hanging, settings);
    let result = chain.analyze(&frame(), Some(selection())).await.unwrap();
    assert_eq!(result.records[0].source, DetectionSource::ManualFallback);
}

fn model_paths() -> Option<(PathBuf, PathBuf)> {
    let face = [
        "models/face_detection_yunet_2023mar_640.onnx",
        "../models/face_detection_yunet_2023mar_640.onnx",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())?;
    let attrs = ["models/genderage.onnx", "../models/genderage.onnx"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())?;
    Some((face, attrs))
}

#[tokio::test]
async fn onnx_stack_on_blank_image_finds_no_faces() {
    let Some((face, attrs)) = model_paths() else {
        eprintln!("skipping ONNX test; models not found");
        return;
    };
    let settings = AppSettings {
        model_path: Some(face.display().to_string()),
        age_gender_model_path: Some(attrs.display().to_string()),
        ..AppSettings::default()
    };
    let stack = FaceStack::from_settings(&settings).expect("load models");
    let chain = DetectionFallbackChain::new(
        Arc::new(stack),
        None::<HttpRemoteEstimator>,
        ChainSettings::from(&settings),
    );

    let blank = ImageFrame::new(RgbImage::from_pixel(320, 240, Rgb([255, 255, 255])));
    let err = chain.analyze(&blank, None).await.unwrap_err();
    assert_eq!(err, agelens_core::AnalysisError::NoFacesDetected);

    let manual = chain
        .analyze(&blank, Some(Rect::new(100.0, 60.0, 80.0, 80.0)))
        .await
        .unwrap();
    assert_eq!(manual.len(), 1);
}
