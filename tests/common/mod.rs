#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use clipsearch::{Embedding, Error, ImageEncoder, ImageFetcher, ImageHandle, Result};
use opencv::core::{CV_8UC3, Mat, Scalar, Vec3b, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

/// 生成纯色 RGB 图片，`tag` 写入红色通道
pub fn tagged_image(tag: u8, width: i32, height: i32) -> ImageHandle {
    let mat = Mat::new_rows_cols_with_default(
        height,
        width,
        CV_8UC3,
        Scalar::new(tag as f64, 0., 0., 0.),
    )
    .unwrap();
    ImageHandle::from_rgb_mat(mat).unwrap()
}

pub fn image_tag(image: &ImageHandle) -> u8 {
    image.as_mat().at_2d::<Vec3b>(0, 0).unwrap()[0]
}

/// 将 BGR 颜色编码为 PNG
pub fn png_bytes(bgr: (f64, f64, f64), width: i32, height: i32) -> Vec<u8> {
    let mat = Mat::new_rows_cols_with_default(
        height,
        width,
        CV_8UC3,
        Scalar::new(bgr.0, bgr.1, bgr.2, 0.),
    )
    .unwrap();
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".png", &mat, &mut buf, &Vector::new()).unwrap();
    buf.to_vec()
}

#[derive(Clone, Copy)]
pub enum Outcome {
    /// 返回带标记的图片
    Image(u8),
    /// 返回宽度为 1 的图片，FakeEncoder 会对其推理失败
    Broken,
    FetchError,
    DecodeError,
}

/// 按预设结果返回图片的下载器，记录每次调用
#[derive(Default)]
pub struct FakeFetcher {
    outcomes: HashMap<String, Outcome>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new<'a>(outcomes: impl IntoIterator<Item = (&'a str, Outcome)>) -> Self {
        Self {
            outcomes: outcomes.into_iter().map(|(url, o)| (url.to_owned(), o)).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_owned(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<ImageHandle> {
        self.calls.lock().unwrap().push(url.to_owned());
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        match self.outcomes.get(url) {
            Some(Outcome::Image(tag)) => Ok(tagged_image(*tag, 16, 12)),
            Some(Outcome::Broken) => Ok(tagged_image(0, 1, 1)),
            Some(Outcome::DecodeError) => {
                Err(Error::Decode { source_name: url.to_owned(), reason: "bad data".into() })
            }
            Some(Outcome::FetchError) | None => {
                Err(Error::Fetch { url: url.to_owned(), reason: "HTTP 404 Not Found".into() })
            }
        }
    }
}

/// 把图片标记编码为 one-hot 向量的编码器，1x1 的图片推理失败
pub struct FakeEncoder {
    pub dimension: usize,
}

impl ImageEncoder for FakeEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, image: &ImageHandle) -> Result<Embedding> {
        if image.width() == 1 && image.height() == 1 {
            return Err(Error::Inference("input too small".into()));
        }
        let mut v = vec![0.; self.dimension];
        v[image_tag(image) as usize % self.dimension] = 1.;
        Ok(v.into())
    }
}

/// one-hot 向量中为 1 的下标
pub fn hot_index(e: &Embedding) -> usize {
    e.as_slice().iter().position(|&x| x == 1.).unwrap()
}

pub fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
