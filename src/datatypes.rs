use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

// 基础整数类型读取函数
pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, std::io::Error> {
    cursor.read_u8()
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, std::io::Error> {
    cursor.read_u16::<LittleEndian>()
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, std::io::Error> {
    cursor.read_u32::<LittleEndian>()
}

pub fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64, std::io::Error> {
    cursor.read_i64::<LittleEndian>()
}

// 基础整数类型写入函数
pub fn write_u8(writer: &mut dyn Write, value: u8) -> Result<(), std::io::Error> {
    writer.write_u8(value)
}

pub fn write_u16(writer: &mut dyn Write, value: u16) -> Result<(), std::io::Error> {
    writer.write_u16::<LittleEndian>(value)
}

pub fn write_u32(writer: &mut dyn Write, value: u32) -> Result<(), std::io::Error> {
    writer.write_u32::<LittleEndian>(value)
}

pub fn write_i64(writer: &mut dyn Write, value: i64) -> Result<(), std::io::Error> {
    writer.write_i64::<LittleEndian>(value)
}

/// 读取u16长度前缀的UTF-8字符串
pub fn read_string16(cursor: &mut Cursor<&[u8]>) -> Result<String, std::io::Error> {
    let length = read_u16(cursor)? as usize;
    let mut buffer = vec![0u8; length];
    cursor.read_exact(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// 写入u16长度前缀的UTF-8字符串
pub fn write_string16(writer: &mut dyn Write, value: &str) -> Result<(), std::io::Error> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "string too long for u16 length prefix",
        ));
    }
    write_u16(writer, bytes.len() as u16)?;
    writer.write_all(bytes)
}

// 文本资源常见编码（日文资产常见cp932，中文资产常见GBK）
const SUPPORTED_ENCODINGS: &[&str] = &["utf-8", "shift_jis", "gbk"];

#[derive(Debug, Clone)]
pub struct RawString {
    pub content: String,
    pub encoding: String,
}

impl RawString {
    /// 尝试多种编码解码
    pub fn decode(data: &[u8]) -> Self {
        for encoding_name in SUPPORTED_ENCODINGS {
            if let Some(encoding) = encoding_rs::Encoding::for_label(encoding_name.as_bytes()) {
                let (decoded, _, had_errors) = encoding.decode(data);
                if !had_errors {
                    return RawString {
                        content: decoded.into_owned(),
                        encoding: encoding_name.to_string(),
                    };
                }
            }
        }

        // 回退到UTF-8，忽略错误
        RawString {
            content: String::from_utf8_lossy(data).into_owned(),
            encoding: "utf-8".to_string(),
        }
    }
}
