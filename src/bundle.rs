use crate::datatypes::{
    read_i64, read_string16, read_u32, write_i64, write_string16, write_u32,
};
use crate::tree::Tree;
use crate::utils::PatchError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use memmap2::Mmap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// bundle文件魔数
pub const BUNDLE_MAGIC: &[u8; 4] = b"BNDL";
/// 当前格式版本
pub const BUNDLE_VERSION: u32 = 1;

// 头部标志位定义
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BundleFlags: u32 {
        /// 对象表整体deflate压缩
        const COMPRESSED = 0x00000001;
    }
}

/// 压缩模式
///
/// 保存时沿用读取到的模式，同一输入重复保存字节一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleCompression {
    None,
    Deflate,
}

/// bundle内的一个对象
///
/// 结构化对象的载荷是树的JSON编码，文本资源的载荷是原始字节。
/// 每个对象打开后最多被改写一次，`is_modified` 决定是否需要落盘。
#[derive(Debug, Clone)]
pub struct BundleObject {
    /// 容器格式分配的稳定对象ID
    pub path_id: i64,
    /// 类型判别名，如 "TextAsset" / "MonoBehaviour"
    pub type_name: String,
    /// 对象名
    pub name: String,
    /// 容器内路径（可缺失）
    pub container: Option<String>,
    /// 载荷字节
    data: Vec<u8>,
    /// 是否已被修改
    pub is_modified: bool,
}

impl BundleObject {
    pub fn new(
        path_id: i64,
        type_name: impl Into<String>,
        name: impl Into<String>,
        container: Option<String>,
        data: Vec<u8>,
    ) -> Self {
        BundleObject {
            path_id,
            type_name: type_name.into(),
            name: name.into(),
            container,
            data,
            is_modified: false,
        }
    }

    /// 用树构造结构化对象（测试和打包工具用）
    pub fn from_tree(
        path_id: i64,
        type_name: impl Into<String>,
        name: impl Into<String>,
        container: Option<String>,
        tree: &Tree,
    ) -> Result<Self, PatchError> {
        let data = serde_json::to_vec(tree)?;
        Ok(Self::new(path_id, type_name, name, container, data))
    }

    /// 按schema读取对象树
    pub fn read_tree(&self) -> Result<Tree, PatchError> {
        let value: serde_json::Value = serde_json::from_slice(&self.data).map_err(|error| {
            PatchError::SchemaDecode(format!("object {}: {}", self.path_id, error))
        })?;
        Ok(Tree::from(value))
    }

    /// 写回对象树并标记修改
    pub fn write_tree(&mut self, tree: &Tree) -> Result<(), PatchError> {
        self.data = serde_json::to_vec(tree)?;
        self.is_modified = true;
        Ok(())
    }

    /// 读取原始字节
    pub fn read_bytes(&self) -> &[u8] {
        &self.data
    }

    /// 覆盖原始字节并标记修改
    pub fn write_bytes(&mut self, bytes: Vec<u8>) {
        self.data = bytes;
        self.is_modified = true;
    }

    /// 容器路径的末段文件名（整体替换按它匹配）
    pub fn container_file_name(&self) -> Option<&str> {
        self.container
            .as_deref()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

/// 已打开的bundle容器
#[derive(Debug)]
pub struct Bundle {
    pub path: PathBuf,
    pub compression: BundleCompression,
    pub objects: Vec<BundleObject>,
}

impl Bundle {
    pub fn new(path: impl Into<PathBuf>, compression: BundleCompression) -> Self {
        Bundle {
            path: path.into(),
            compression,
            objects: Vec::new(),
        }
    }

    /// 加载bundle文件（内存映射，零拷贝解析）
    pub fn load(path: PathBuf) -> Result<Self, PatchError> {
        let file = std::fs::File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let mut bundle = Self::from_bytes(&mmap)?;
        bundle.path = path;
        Ok(bundle)
    }

    /// 从字节解析
    pub fn from_bytes(data: &[u8]) -> Result<Self, PatchError> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != BUNDLE_MAGIC {
            return Err(PatchError::InvalidFormat);
        }

        let version = read_u32(&mut cursor)?;
        if version != BUNDLE_VERSION {
            return Err(PatchError::UnsupportedVersion(version));
        }

        let flags = BundleFlags::from_bits_truncate(read_u32(&mut cursor)?);
        let object_count = read_u32(&mut cursor)?;

        let body_start = cursor.position() as usize;
        let (body, compression) = if flags.contains(BundleFlags::COMPRESSED) {
            let mut decoder = ZlibDecoder::new(&data[body_start..]);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            (decompressed, BundleCompression::Deflate)
        } else {
            (data[body_start..].to_vec(), BundleCompression::None)
        };

        let mut body_cursor = Cursor::new(&body[..]);
        let mut objects = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            objects.push(Self::read_object(&mut body_cursor)?);
        }

        Ok(Bundle {
            path: PathBuf::new(),
            compression,
            objects,
        })
    }

    fn read_object(cursor: &mut Cursor<&[u8]>) -> Result<BundleObject, PatchError> {
        let path_id = read_i64(cursor)?;
        let type_name = read_string16(cursor)?;
        let name = read_string16(cursor)?;
        let container_raw = read_string16(cursor)?;
        let container = (!container_raw.is_empty()).then_some(container_raw);

        let payload_size = read_u32(cursor)? as usize;
        let mut data = vec![0u8; payload_size];
        cursor.read_exact(&mut data)?;

        Ok(BundleObject::new(path_id, type_name, name, container, data))
    }

    /// 序列化为字节（与读取时相同的压缩模式）
    pub fn to_bytes(&self) -> Result<Vec<u8>, PatchError> {
        let mut body = Vec::new();
        for object in &self.objects {
            write_i64(&mut body, object.path_id)?;
            write_string16(&mut body, &object.type_name)?;
            write_string16(&mut body, &object.name)?;
            write_string16(&mut body, object.container.as_deref().unwrap_or(""))?;
            write_u32(&mut body, object.data.len() as u32)?;
            body.write_all(&object.data)?;
        }

        let (flags, body) = match self.compression {
            BundleCompression::None => (BundleFlags::empty(), body),
            BundleCompression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&body)?;
                (BundleFlags::COMPRESSED, encoder.finish()?)
            }
        };

        let mut output = Vec::with_capacity(16 + body.len());
        output.extend_from_slice(BUNDLE_MAGIC);
        write_u32(&mut output, BUNDLE_VERSION)?;
        write_u32(&mut output, flags.bits())?;
        write_u32(&mut output, self.objects.len() as u32)?;
        output.extend_from_slice(&body);

        Ok(output)
    }

    /// 覆盖写回原路径
    pub fn save(&self) -> Result<(), PatchError> {
        self.save_to(&self.path)
    }

    /// 写到指定路径
    pub fn save_to(&self, path: &Path) -> Result<(), PatchError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// 任一对象被修改即为脏
    pub fn is_modified(&self) -> bool {
        self.objects.iter().any(|object| object.is_modified)
    }
}
