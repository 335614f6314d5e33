//! 按原始顺序保存的 zip 部件列表

// 标准库导入
use std::io::{Cursor, Read, Write};

// 第三方crate导入
use anyhow::{Context, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 包中的一个条目
#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// OOXML 包
///
/// 未修改的部件原样写回，条目顺序与压缩方式保持不变。
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    entries: Vec<PackageEntry>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).context("不是有效的zip容器")?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .with_context(|| format!("无法读取zip条目 #{}", i))?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let compression = file.compression();

            let mut data = Vec::with_capacity(file.size() as usize);
            if !is_dir {
                file.read_to_end(&mut data)
                    .with_context(|| format!("无法解压部件: {}", name))?;
            }

            entries.push(PackageEntry {
                name,
                data,
                compression,
                is_dir,
            });
        }

        Ok(Self { entries })
    }

    /// 按部件名查找（忽略前导 `/` 与大小写）
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.find(name).map(|idx| self.entries[idx].data.as_slice())
    }

    /// 替换已有部件内容，不存在时追加
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.find(name) {
            Some(idx) => self.entries[idx].data = data,
            None => self.entries.push(PackageEntry {
                name: canonical(name).to_string(),
                data,
                compression: CompressionMethod::Deflated,
                is_dir: false,
            }),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name.as_str())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let method = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = FileOptions::<()>::default().compression_method(method);

            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)
                    .with_context(|| format!("无法写入目录条目: {}", entry.name))?;
                continue;
            }

            zip.start_file(entry.name.as_str(), options)
                .with_context(|| format!("无法写入部件: {}", entry.name))?;
            zip.write_all(&entry.data)
                .with_context(|| format!("无法写入部件内容: {}", entry.name))?;
        }

        let cursor = zip.finish().context("无法完成zip写入")?;
        Ok(cursor.into_inner())
    }

    fn find(&self, name: &str) -> Option<usize> {
        let wanted = canonical(name);
        self.entries
            .iter()
            .position(|entry| !entry.is_dir && canonical(&entry.name).eq_ignore_ascii_case(wanted))
    }
}

fn canonical(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zip() -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        let deflated =
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("[Content_Types].xml", deflated).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("xl/media/image1.png", stored).unwrap();
        zip.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_parts_survive_rewrite() {
        let package = XlsxPackage::from_bytes(&sample_zip()).unwrap();
        let rewritten = XlsxPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();

        let names: Vec<&str> = rewritten.part_names().collect();
        assert_eq!(names, vec!["[Content_Types].xml", "xl/media/image1.png"]);
        assert_eq!(rewritten.part("/XL/media/image1.png").unwrap(), &[0x89, b'P', b'N', b'G']);
        assert_eq!(rewritten.entries[1].compression, CompressionMethod::Stored);
    }

    #[test]
    fn test_set_part() {
        let mut package = XlsxPackage::from_bytes(&sample_zip()).unwrap();
        package.set_part("[Content_Types].xml", b"<Types></Types>".to_vec());
        package.set_part("xl/new.xml", b"<x/>".to_vec());

        assert_eq!(package.part("[Content_Types].xml").unwrap(), b"<Types></Types>");
        assert_eq!(package.part("xl/new.xml").unwrap(), b"<x/>");
    }

    #[test]
    fn test_rejects_non_zip() {
        assert!(XlsxPackage::from_bytes(b"plain text").is_err());
    }
}
