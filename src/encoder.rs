use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use ndarray::Array4;
use opencv::core::{Mat, Rect, Size, Vec3b};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::config::Device;
use crate::error::{Error, Result};
use crate::loader::ImageHandle;

/// CLIP ViT-B/32 图像向量维度
pub const EMBEDDING_DIM: usize = 512;

/// CLIP 输入图片边长
pub const CLIP_IMAGE_SIZE: i32 = 224;
#[allow(clippy::excessive_precision)]
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
#[allow(clippy::excessive_precision)]
const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// 图片的特征向量，生成后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

/// 图像编码器：把一张图片转换为固定长度的向量
pub trait ImageEncoder: Sync {
    /// 输出向量的维度
    fn dimension(&self) -> usize;

    /// 计算图片的特征向量，同一张图片的结果总是相同
    fn embed(&self, image: &ImageHandle) -> Result<Embedding>;
}

/// 基于 ONNX Runtime 的 CLIP 图像编码器
///
/// 推理会话放在互斥锁中，同一时刻只有一次前向推理
pub struct ClipEncoder {
    session: Mutex<Session>,
    model: String,
    dimension: usize,
}

impl ClipEncoder {
    /// 加载编码器，整个进程只需要加载一次
    ///
    /// # Arguments
    ///
    /// * `model` - ONNX 模型路径，或形如 `openai/clip-vit-base-patch32` 的模型名
    /// * `device` - 推理设备
    /// * `models_dir` - 按模型名查找模型文件的目录
    pub fn initialize(model: &str, device: Device, models_dir: &Path) -> Result<Self> {
        let load_err = |reason: String| Error::ModelLoad { model: model.to_owned(), reason };

        let path = resolve_model(model, models_dir)?;
        info!("加载 CLIP 模型: {}", path.display());

        let builder = Session::builder().map_err(|e| load_err(e.to_string()))?;
        let builder = register_device(builder, device).map_err(load_err)?;
        let session = builder
            .with_intra_threads(num_cpus::get())
            .and_then(|b| b.commit_from_file(&path))
            .map_err(|e| load_err(e.to_string()))?;

        Ok(Self { session: Mutex::new(session), model: model.to_owned(), dimension: EMBEDDING_DIM })
    }

    /// 指定模型输出维度，默认为 [`EMBEDDING_DIM`]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ImageEncoder for ClipEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, image: &ImageHandle) -> Result<Embedding> {
        let input = preprocess(image)?;
        let input = Tensor::from_array(input).map_err(|e| Error::Inference(e.to_string()))?;

        let mut session =
            self.session.lock().map_err(|_| Error::Inference("推理会话已损坏".into()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| Error::Inference(e.to_string()))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(e.to_string()))?;

        if data.len() != self.dimension {
            return Err(Error::Inference(format!(
                "模型输出维度为 {}，期望 {}",
                data.len(),
                self.dimension
            )));
        }
        debug!("图片 {}x{} 编码完成", image.width(), image.height());
        Ok(Embedding(data.to_vec()))
    }
}

/// 按模型名或路径找到 ONNX 模型文件
///
/// 模型名中的 `/` 会被替换为 `--`，例如 `openai/clip-vit-base-patch32`
/// 对应 `<models_dir>/openai--clip-vit-base-patch32.onnx`
pub fn resolve_model(model: &str, models_dir: &Path) -> Result<PathBuf> {
    let path = Path::new(model);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let candidate = models_dir.join(format!("{}.onnx", model.replace('/', "--")));
    if candidate.is_file() {
        return Ok(candidate);
    }
    Err(Error::ModelLoad {
        model: model.to_owned(),
        reason: format!("找不到模型文件 {}", candidate.display()),
    })
}

#[cfg(feature = "cuda")]
fn register_device(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> std::result::Result<ort::session::builder::SessionBuilder, String> {
    use ort::execution_providers::CUDAExecutionProvider;

    let cuda = CUDAExecutionProvider::default().build();
    match device {
        Device::Cpu => Ok(builder),
        // 注册失败时回退到 CPU
        Device::Auto => builder.with_execution_providers([cuda]).map_err(|e| e.to_string()),
        Device::Cuda => builder
            .with_execution_providers([cuda.error_on_failure()])
            .map_err(|e| e.to_string()),
    }
}

#[cfg(not(feature = "cuda"))]
fn register_device(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> std::result::Result<ort::session::builder::SessionBuilder, String> {
    match device {
        Device::Cpu | Device::Auto => Ok(builder),
        Device::Cuda => Err("编译时未启用 cuda 特性".into()),
    }
}

/// CLIP 预处理：短边缩放到 224，居中裁剪，再按 CLIP 均值方差归一化为 NCHW
pub fn preprocess(image: &ImageHandle) -> Result<Array4<f32>> {
    let (width, height) = (image.width(), image.height());
    if width <= 0 || height <= 0 {
        return Err(Error::Inference(format!("无效的图片尺寸 {width}x{height}")));
    }

    let size = CLIP_IMAGE_SIZE;
    let scale = size as f64 / width.min(height) as f64;
    let new_width = ((width as f64 * scale).round() as i32).max(size);
    let new_height = ((height as f64 * scale).round() as i32).max(size);

    let mut resized = Mat::default();
    imgproc::resize(
        image.as_mat(),
        &mut resized,
        Size::new(new_width, new_height),
        0.,
        0.,
        imgproc::InterpolationFlags::INTER_CUBIC as i32,
    )?;

    let crop = Rect::new((new_width - size) / 2, (new_height - size) / 2, size, size);
    let cropped = Mat::roi(&resized, crop)?;

    let n = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for y in 0..size {
        for x in 0..size {
            let pixel = cropped.at_2d::<Vec3b>(y, x)?;
            for c in 0..3 {
                let val = pixel[c] as f32 / 255.;
                tensor[[0, c, y as usize, x as usize]] = (val - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_model("openai/clip-vit-base-patch32", dir.path()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }

    #[test]
    fn resolve_model_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("openai--clip-vit-base-patch32.onnx");
        std::fs::write(&file, b"").unwrap();
        let path = resolve_model("openai/clip-vit-base-patch32", dir.path()).unwrap();
        assert_eq!(path, file);
    }

    #[test]
    fn embedding_serializes_as_array() {
        let e = Embedding::from(vec![0.5, 1.0]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[0.5,1.0]");
    }
}
