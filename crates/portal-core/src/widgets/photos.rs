//! Photo staging for the maintenance form. Every count, size and type check
//! runs before anything reaches storage.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::html::escape;
use crate::config::PhotoLimits;
use crate::error::{PortalError, Result};
use crate::facade::DataAccess;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoFile {
    pub name: String,
    /// Declared MIME type, as the file picker reports it.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased name extension, falling back to the MIME subtype.
    pub fn extension(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .or_else(|| self.content_type.rsplit_once('/').map(|(_, sub)| sub))
            .unwrap_or("bin")
            .to_lowercase()
    }
}

/// Size and type check for one file.
pub fn check_file(file: &PhotoFile, limits: &PhotoLimits) -> std::result::Result<(), String> {
    if file.size() > limits.max_size_bytes {
        let mb = limits.max_size_bytes / (1024 * 1024);
        return Err(format!("{} çok büyük! Maksimum {mb}MB", file.name));
    }
    if !limits
        .allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&file.content_type))
    {
        return Err(format!("{} desteklenmeyen format!", file.name));
    }
    Ok(())
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Outcome of offering a batch to the staging area.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub accepted: usize,
    pub rejected: Vec<String>,
}

/// Photos picked for a record: URLs already stored plus files waiting to
/// be uploaded.
#[derive(Debug, Clone)]
pub struct PhotoStaging {
    limits: PhotoLimits,
    existing: Vec<String>,
    staged: Vec<PhotoFile>,
}

impl PhotoStaging {
    pub fn new(limits: PhotoLimits) -> Self {
        Self {
            limits,
            existing: Vec::new(),
            staged: Vec::new(),
        }
    }

    pub fn with_existing(limits: PhotoLimits, urls: Vec<String>) -> Self {
        Self {
            existing: urls,
            ..Self::new(limits)
        }
    }

    pub fn existing(&self) -> &[String] {
        &self.existing
    }

    pub fn staged(&self) -> &[PhotoFile] {
        &self.staged
    }

    pub fn total(&self) -> usize {
        self.existing.len() + self.staged.len()
    }

    /// A batch that would exceed the file limit is refused whole. Otherwise
    /// each file is checked on its own; good files are staged even when
    /// some of their siblings fail.
    pub fn add(&mut self, files: Vec<PhotoFile>) -> std::result::Result<AddOutcome, PortalError> {
        if self.total() + files.len() > self.limits.max_files {
            return Err(PortalError::validation(format!(
                "En fazla {} fotoğraf yükleyebilirsiniz!",
                self.limits.max_files
            )));
        }

        let mut outcome = AddOutcome::default();
        for file in files {
            match check_file(&file, &self.limits) {
                Ok(()) => {
                    debug!(name = %file.name, size = file.size(), "photo staged");
                    self.staged.push(file);
                    outcome.accepted += 1;
                }
                Err(message) => {
                    warn!(name = %file.name, %message, "photo rejected");
                    outcome.rejected.push(message);
                }
            }
        }
        Ok(outcome)
    }

    pub fn remove_staged(&mut self, index: usize) -> Option<PhotoFile> {
        (index < self.staged.len()).then(|| self.staged.remove(index))
    }

    pub fn remove_existing(&mut self, index: usize) -> Option<String> {
        (index < self.existing.len()).then(|| self.existing.remove(index))
    }

    /// Uploads every staged file under `record_id` and returns the full
    /// URL list, existing first.
    pub async fn upload_all(
        &mut self,
        data: &DataAccess,
        record_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut urls = self.existing.clone();
        if !self.staged.is_empty() {
            let uploaded = data
                .upload_photos(record_id, self.staged.clone(), cancel)
                .await?;
            urls.extend(uploaded);
            self.staged.clear();
            self.existing = urls.clone();
        }
        Ok(urls)
    }

    pub fn render(&self) -> String {
        let mut out = String::from(r#"<div class="photo-uploader">"#);
        if self.total() < self.limits.max_files {
            out.push_str(&format!(
                r#"<label class="photo-drop-zone" data-action="pick-photos">📷 Fotoğraf ekle ({}/{})</label>"#,
                self.total(),
                self.limits.max_files
            ));
        }
        out.push_str(r#"<div class="photo-preview-grid">"#);
        for (i, url) in self.existing.iter().enumerate() {
            out.push_str(&format!(
                r#"<div class="photo-preview"><img src="{}" alt="Fotoğraf {}"><button class="photo-remove" data-action="remove-existing-photo" data-index="{i}">✕</button></div>"#,
                escape(url),
                i + 1
            ));
        }
        for (i, file) in self.staged.iter().enumerate() {
            out.push_str(&format!(
                r#"<div class="photo-preview staged"><span class="photo-name">{}</span><span class="photo-size">{}</span><button class="photo-remove" data-action="remove-staged-photo" data-index="{i}">✕</button></div>"#,
                escape(&file.name),
                format_file_size(file.size())
            ));
        }
        out.push_str("</div></div>");
        out
    }
}

/// Read-only grid used once a record is completed.
pub fn render_static_grid(urls: &[String]) -> String {
    if urls.is_empty() {
        return r#"<p class="no-data">Fotoğraf yüklenmemiş.</p>"#.to_string();
    }
    let items = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            format!(
                r#"<a href="{0}" target="_blank" class="photo-preview"><img src="{0}" alt="Fotoğraf {1}"></a>"#,
                escape(url),
                i + 1
            )
        })
        .collect::<String>();
    format!(r#"<div class="photo-preview-grid">{items}</div>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PhotoLimits {
        PhotoLimits {
            max_files: 2,
            max_size_bytes: 5 * 1024 * 1024,
            allowed_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }

    fn jpeg(name: &str) -> PhotoFile {
        PhotoFile::new(name, "image/jpeg", vec![0xFF; 16])
    }

    #[test]
    fn third_photo_is_refused_as_a_batch() {
        let mut staging = PhotoStaging::with_existing(limits(), vec!["memory://a".to_string()]);
        let err = staging
            .add(vec![jpeg("b.jpg"), jpeg("c.jpg")])
            .expect_err("over limit");
        assert_eq!(
            err,
            PortalError::validation("En fazla 2 fotoğraf yükleyebilirsiniz!")
        );
        assert!(staging.staged().is_empty());
    }

    #[test]
    fn bad_files_are_rejected_one_by_one() {
        let mut staging = PhotoStaging::new(limits());
        let huge = PhotoFile::new("big.png", "image/png", vec![0; 6 * 1024 * 1024]);
        let gif = PhotoFile::new("anim.gif", "image/gif", vec![1, 2, 3]);
        let outcome = staging.add(vec![huge, gif]).expect("within count");
        assert_eq!(outcome.accepted, 0);
        assert_eq!(
            outcome.rejected,
            vec![
                "big.png çok büyük! Maksimum 5MB".to_string(),
                "anim.gif desteklenmeyen format!".to_string()
            ]
        );

        let outcome = staging
            .add(vec![jpeg("ok.JPG"), PhotoFile::new("x.bmp", "image/bmp", vec![1])])
            .expect("within count");
        assert_eq!(outcome.accepted, 1);
        assert_eq!(staging.staged()[0].extension(), "jpg");
    }

    #[test]
    fn removal_and_rendering() {
        let mut staging = PhotoStaging::with_existing(limits(), vec!["memory://p/1.jpg".to_string()]);
        staging.add(vec![jpeg("new.jpg")]).expect("staged");
        assert!(!staging.render().contains("Fotoğraf ekle"));
        assert_eq!(staging.remove_existing(0).as_deref(), Some("memory://p/1.jpg"));
        assert!(staging.remove_staged(3).is_none());
        assert!(staging.render().contains("Fotoğraf ekle (1/2)"));
        assert!(render_static_grid(&[]).contains("Fotoğraf yüklenmemiş."));
    }

    #[test]
    fn file_sizes_use_binary_units() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }
}
