//! Burning a signature mark into the first page of a PDF.
//!
//! Pure byte-buffer transform: no storage, no workflow state. Either a
//! complete, re-parseable PDF comes back or an error does.
//!
//! Every object of the source survives. The first page gains:
//!
//! - a leading `q` stream and a trailing `Q` stream around its original
//!   content, so graphics state left dangling by that content cannot move
//!   the mark;
//! - one mark stream after the `Q`;
//! - font or image resources under names that do not collide with existing
//!   ones. Inherited resources are copied into the page, never edited in
//!   place, so sibling pages are untouched.

use std::io::Write;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};

use crate::errors::AppError;
use crate::signing::coords::{MarkPlacement, PageSize};
use crate::signing::mark::SignatureMark;

const PRIMARY_FONT: &str = "Helvetica-Bold";
const PRIMARY_SIZE: f64 = 14.0;
const PRIMARY_RGB: (f64, f64, f64) = (0.0, 0.0, 0.6);
/// The name line sits this far above the timestamp line.
const PRIMARY_RISE: f64 = 20.0;

const META_FONT: &str = "Helvetica";
const META_SIZE: f64 = 8.0;
const META_RGB: (f64, f64, f64) = (0.4, 0.4, 0.4);

const MAX_TREE_DEPTH: usize = 64;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// A parsed PDF ready to be marked.
pub struct LoadedDocument {
    doc: lopdf::Document,
    first_page: ObjectId,
    page_count: usize,
}

/// Parse `bytes` as a PDF with at least one page.
pub fn load(bytes: &[u8]) -> Result<LoadedDocument, AppError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::Format(format!("not a readable PDF: {e}")))?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(AppError::Format("encrypted PDFs are not supported".to_string()));
    }

    let pages = doc.get_pages();
    let first_page = pages
        .values()
        .next()
        .copied()
        .ok_or_else(|| AppError::Format("document has no pages".to_string()))?;

    Ok(LoadedDocument {
        page_count: pages.len(),
        doc,
        first_page,
    })
}

impl LoadedDocument {
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Width and height of the first page's MediaBox, in points.
    pub fn first_page_size(&self) -> Result<PageSize, AppError> {
        let (_, _, width, height) = self.first_page_box()?;
        Ok(PageSize { width, height })
    }

    /// Draw `mark` at `placement` (page-relative points) and serialize.
    pub fn apply(
        mut self,
        placement: &MarkPlacement,
        mark: &SignatureMark,
        signed_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, AppError> {
        let (origin_x, origin_y, _, _) = self.first_page_box()?;
        let x = origin_x + placement.x;
        let y = origin_y + placement.y;

        let mut resources = self.inherited_dict(b"Resources")?;
        let mark_ops = match mark {
            SignatureMark::Text { signer_name } => {
                let mut fonts = self.sub_dict(&resources, b"Font")?;
                let primary = self.add_font(&mut fonts, "CsSigPrimary", PRIMARY_FONT);
                let meta = self.add_font(&mut fonts, "CsSigMeta", META_FONT);
                resources.set("Font", Object::Dictionary(fonts));
                text_ops(&primary, &meta, x, y, signer_name, signed_at)
            }
            SignatureMark::Image { bytes } => {
                let mut xobjects = self.sub_dict(&resources, b"XObject")?;
                let name = unique_name(&xobjects, "CsSigImage");
                let image_id = self.add_image(bytes)?;
                xobjects.set(name.as_bytes(), image_id);
                resources.set("XObject", Object::Dictionary(xobjects));
                image_ops(&name, x, y, placement.image_width, placement.image_height)
            }
        };

        let mut contents = vec![Object::Reference(
            self.doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec())),
        )];
        contents.extend(self.existing_contents()?);
        let mut tail = b"Q\n".to_vec();
        tail.extend_from_slice(&mark_ops);
        contents.push(Object::Reference(
            self.doc.add_object(Stream::new(dictionary! {}, tail)),
        ));

        let page = self
            .doc
            .get_object_mut(self.first_page)
            .and_then(|o| o.as_dict_mut())
            .map_err(|_| AppError::Format("first page is not a dictionary".to_string()))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| AppError::Format(format!("could not serialize PDF: {e}")))?;

        let reparsed = lopdf::Document::load_mem(&out)
            .map_err(|e| AppError::Format(format!("annotated PDF failed to re-parse: {e}")))?;
        if reparsed.get_pages().len() != self.page_count {
            return Err(AppError::Format("annotated PDF lost pages".to_string()));
        }
        Ok(out)
    }

    /// (llx, lly, width, height) of the first page's MediaBox.
    fn first_page_box(&self) -> Result<(f64, f64, f64, f64), AppError> {
        let media_box = self
            .inherited(b"MediaBox")?
            .ok_or_else(|| AppError::Format("first page has no MediaBox".to_string()))?;
        let arr = self
            .resolve(media_box)?
            .as_array()
            .map_err(|_| AppError::Format("MediaBox is not an array".to_string()))?;
        let nums: Vec<f64> = arr.iter().filter_map(obj_to_f64).collect();
        if arr.len() != 4 || nums.len() != 4 {
            return Err(AppError::Format("MediaBox must hold four numbers".to_string()));
        }
        let (llx, lly) = (nums[0].min(nums[2]), nums[1].min(nums[3]));
        let (width, height) = ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
        if width <= 0.0 || height <= 0.0 {
            return Err(AppError::Format("first page has an empty MediaBox".to_string()));
        }
        Ok((llx, lly, width, height))
    }

    /// Look `key` up on the first page, then up its Parent chain.
    fn inherited(&self, key: &[u8]) -> Result<Option<&Object>, AppError> {
        let mut current = Some(self.first_page);
        let mut depth = 0;
        while let Some(id) = current {
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                return Err(AppError::Format("page tree is cyclic or too deep".to_string()));
            }
            let node = self
                .doc
                .get_object(id)
                .and_then(|o| o.as_dict())
                .map_err(|_| AppError::Format("page tree node is not a dictionary".to_string()))?;
            if let Ok(value) = node.get(key) {
                return Ok(Some(value));
            }
            current = node.get(b"Parent").and_then(|p| p.as_reference()).ok();
        }
        Ok(None)
    }

    /// Owned copy of an inherited dictionary entry, empty if absent.
    fn inherited_dict(&self, key: &[u8]) -> Result<Dictionary, AppError> {
        match self.inherited(key)? {
            Some(obj) => self.owned_dict(obj, key),
            None => Ok(Dictionary::new()),
        }
    }

    fn sub_dict(&self, parent: &Dictionary, key: &[u8]) -> Result<Dictionary, AppError> {
        match parent.get(key) {
            Ok(obj) => self.owned_dict(obj, key),
            Err(_) => Ok(Dictionary::new()),
        }
    }

    fn owned_dict(&self, obj: &Object, key: &[u8]) -> Result<Dictionary, AppError> {
        self.resolve(obj)?.as_dict().cloned().map_err(|_| {
            AppError::Format(format!("{} is not a dictionary", String::from_utf8_lossy(key)))
        })
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object, AppError> {
        match obj {
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .map_err(|e| AppError::Format(format!("dangling reference {id:?}: {e}"))),
            other => Ok(other),
        }
    }

    /// The first page's content streams as a flat list of references.
    fn existing_contents(&mut self) -> Result<Vec<Object>, AppError> {
        let contents = match self.inherited_page_entry(b"Contents") {
            Some(obj) => obj,
            None => return Ok(Vec::new()),
        };
        match contents {
            Object::Reference(id) => match self.doc.get_object(id) {
                Ok(Object::Array(items)) => Ok(items.clone()),
                Ok(_) => Ok(vec![Object::Reference(id)]),
                Err(e) => Err(AppError::Format(format!("dangling content stream {id:?}: {e}"))),
            },
            Object::Array(items) => Ok(items),
            Object::Stream(stream) => Ok(vec![Object::Reference(self.doc.add_object(stream))]),
            _ => Err(AppError::Format("page Contents has an unexpected type".to_string())),
        }
    }

    /// Contents is not inheritable; read it from the page itself.
    fn inherited_page_entry(&self, key: &[u8]) -> Option<Object> {
        self.doc
            .get_object(self.first_page)
            .and_then(|o| o.as_dict())
            .and_then(|d| d.get(key))
            .ok()
            .cloned()
    }

    fn add_font(&mut self, fonts: &mut Dictionary, base_name: &str, base_font: &str) -> String {
        let name = unique_name(fonts, base_name);
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(name.as_bytes(), font_id);
        name
    }

    /// Embed PNG/JPEG bytes as an RGB image XObject with an alpha soft mask.
    fn add_image(&mut self, bytes: &[u8]) -> Result<ObjectId, AppError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AppError::BadInput(format!("signature image could not be decoded: {e}")))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(AppError::BadInput("signature image has no pixels".to_string()));
        }

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in img.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };

        if alpha.iter().any(|&a| a != u8::MAX) {
            let smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(&alpha)?,
            );
            let smask_id = self.doc.add_object(smask);
            image_dict.set("SMask", smask_id);
        }

        Ok(self.doc.add_object(Stream::new(image_dict, deflate(&rgb)?)))
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| AppError::Format(format!("could not compress image data: {e}")))
}

fn unique_name(dict: &Dictionary, base: &str) -> String {
    if !dict.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}{i}"))
        .find(|candidate| !dict.has(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

/// Compact decimal for content streams: at most four places, no exponent.
fn num(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Encode `text` as the body of a PDF literal string in WinAnsi.
/// Characters WinAnsi cannot express become `?`.
fn pdf_literal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(ch as u8);
            }
            c if (c as u32) < 0x80 => out.push(c as u8),
            c if (0xA0..=0xFF).contains(&(c as u32)) => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn text_line(font: &str, size: f64, rgb: (f64, f64, f64), x: f64, y: f64, text: &str) -> Vec<u8> {
    let mut ops = format!(
        "BT\n/{font} {} Tf\n{} {} {} rg\n{} {} Td\n(",
        num(size),
        num(rgb.0),
        num(rgb.1),
        num(rgb.2),
        num(x),
        num(y)
    )
    .into_bytes();
    ops.extend(pdf_literal(text));
    ops.extend_from_slice(b") Tj\nET\n");
    ops
}

fn text_ops(
    primary_font: &str,
    meta_font: &str,
    x: f64,
    y: f64,
    signer_name: &str,
    signed_at: DateTime<Utc>,
) -> Vec<u8> {
    let mut ops = b"q\n".to_vec();
    ops.extend(text_line(
        primary_font,
        PRIMARY_SIZE,
        PRIMARY_RGB,
        x,
        y + PRIMARY_RISE,
        &format!("Digitally Signed by: {signer_name}"),
    ));
    ops.extend(text_line(
        meta_font,
        META_SIZE,
        META_RGB,
        x,
        y,
        &format!("Date: {}", signed_at.format(TIMESTAMP_FORMAT)),
    ));
    ops.extend_from_slice(b"Q\n");
    ops
}

fn image_ops(name: &str, x: f64, y: f64, width: f64, height: f64) -> Vec<u8> {
    format!(
        "q\n{} 0 0 {} {} {} cm\n/{name} Do\nQ\n",
        num(width),
        num(height),
        num(x),
        num(y)
    )
    .into_bytes()
}
