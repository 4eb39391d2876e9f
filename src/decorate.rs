use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use crate::config::{DocumentConfig, LogoImage};
use crate::error::RenderError;
use crate::layout::{LaidOut, PageSnapshot};
use crate::matter::fit;
use crate::metrics::{StandardFont, encode_win_ansi};

const INCH: f64 = 72.0;

const FONT_REGULAR: &str = "LpHelv";
const FONT_BOLD: &str = "LpHelvB";
const LOGO: &str = "LpLogo";

const PAGE_NUMBER_SIZE: f64 = 9.0;
const COMPANY_SIZE: f64 = 12.0;
const LETTERHEAD_SIZE: f64 = 9.0;
const DISCLAIMER_SIZE: f64 = 8.0;

const LOGO_BOX_WIDTH: f64 = 1.5 * INCH;
const LOGO_BOX_HEIGHT: f64 = 0.75 * INCH;

/// Fonts and images shared by every decorated page.
struct SharedResources {
    regular: ObjectId,
    bold: ObjectId,
    logo: Option<EmbeddedLogo>,
}

struct EmbeddedLogo {
    id: ObjectId,
    width_px: u32,
    height_px: u32,
}

impl LaidOut {
    /// Decorate every page and serialize the finished document.
    pub fn decorate(self, config: &DocumentConfig) -> Result<Vec<u8>, RenderError> {
        let LaidOut {
            mut document,
            pages,
        } = self;

        let total = pages.len();
        let numbered = if config.include_title_page {
            total.saturating_sub(1)
        } else {
            total
        };

        let shared = SharedResources {
            regular: add_font(&mut document, StandardFont::Helvetica),
            bold: add_font(&mut document, StandardFont::HelveticaBold),
            logo: config.logo.as_ref().and_then(|logo| {
                embed_logo(&mut document, logo)
                    .map_err(|e| warn!("logo skipped: {e}"))
                    .ok()
            }),
        };

        for page in &pages {
            if config.include_title_page && page.index == 0 {
                debug!("page 1 is the title page, left undecorated");
                continue;
            }
            let number = if config.include_title_page {
                page.index
            } else {
                page.index + 1
            };
            match decorate_page(&mut document, page, number, numbered, config, &shared) {
                Ok(()) => debug!("decorated page {} as {number} of {numbered}", page.index + 1),
                Err(e) => warn!("page {} left undecorated: {e}", page.index + 1),
            }
        }

        let mut out = Vec::new();
        document.save_to(&mut out)?;
        Ok(out)
    }
}

fn decorate_page(
    document: &mut Document,
    page: &PageSnapshot,
    number: usize,
    numbered: usize,
    config: &DocumentConfig,
    shared: &SharedResources,
) -> Result<(), lopdf::Error> {
    let mut entries = vec![
        (b"Font".as_slice(), FONT_REGULAR, shared.regular),
        (b"Font".as_slice(), FONT_BOLD, shared.bold),
    ];
    if let Some(logo) = &shared.logo {
        entries.push((b"XObject".as_slice(), LOGO, logo.id));
    }
    register_resources(document, page.page_id, &entries)?;

    let mut ops = Vec::new();
    page_number(&mut ops, page, number, numbered);
    if let Some(logo) = &shared.logo {
        logo_ops(&mut ops, page, logo);
    }
    letterhead(&mut ops, page, config);
    disclaimer(&mut ops, page, &config.disclaimer);

    let decoration = Content { operations: ops }.encode()?;
    wrap_contents(document, page.page_id, decoration)
}

fn page_number(ops: &mut Vec<Operation>, page: &PageSnapshot, number: usize, numbered: usize) {
    let text = format!("Page {number} of {numbered}");
    let width = StandardFont::Helvetica.text_width(&text, PAGE_NUMBER_SIZE);
    let x = page.media_box[0] + page.width() - 0.75 * INCH - width;
    let y = page.media_box[1] + 0.75 * INCH;
    show_text(ops, FONT_REGULAR, PAGE_NUMBER_SIZE, x, y, &text);
}

fn letterhead(ops: &mut Vec<Operation>, page: &PageSnapshot, config: &DocumentConfig) {
    let x = page.media_box[0] + 0.75 * INCH;
    let top = page.media_box[1] + page.height();
    let head = &config.letterhead;

    if !head.company.is_empty() {
        show_text(ops, FONT_BOLD, COMPANY_SIZE, x, top - 0.75 * INCH, &head.company);
    }
    let lines = [
        (0.95, Some(head.address.as_str())),
        (1.1, Some(head.phone.as_str())),
        (1.25, head.email.as_deref()),
    ];
    for (offset, line) in lines {
        if let Some(line) = line.filter(|line| !line.is_empty()) {
            show_text(ops, FONT_REGULAR, LETTERHEAD_SIZE, x, top - offset * INCH, line);
        }
    }
}

fn logo_ops(ops: &mut Vec<Operation>, page: &PageSnapshot, logo: &EmbeddedLogo) {
    let box_x = page.media_box[0] + page.width() - 2.5 * INCH;
    let box_y = page.media_box[1] + page.height() - 1.25 * INCH;
    let (w, h) = fit(
        f64::from(logo.width_px.max(1)),
        f64::from(logo.height_px.max(1)),
        LOGO_BOX_WIDTH,
        LOGO_BOX_HEIGHT,
    );
    let x = box_x + (LOGO_BOX_WIDTH - w) / 2.0;
    let y = box_y + (LOGO_BOX_HEIGHT - h) / 2.0;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![
            w.into(),
            0.into(),
            0.into(),
            h.into(),
            x.into(),
            y.into(),
        ],
    ));
    ops.push(Operation::new("Do", vec![LOGO.into()]));
    ops.push(Operation::new("Q", vec![]));
}

fn disclaimer(ops: &mut Vec<Operation>, page: &PageSnapshot, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    let font = StandardFont::Helvetica;
    let text = font.truncate_to_width(text.trim(), DISCLAIMER_SIZE, page.width() - 1.5 * INCH);
    let width = font.text_width(&text, DISCLAIMER_SIZE);
    let x = page.media_box[0] + (page.width() - width) / 2.0;
    let y = page.media_box[1] + 0.5 * INCH;
    show_text(ops, FONT_REGULAR, DISCLAIMER_SIZE, x, y, &text);
}

fn show_text(ops: &mut Vec<Operation>, font: &str, size: f64, x: f64, y: f64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("g", vec![0.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn add_font(document: &mut Document, font: StandardFont) -> ObjectId {
    document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_name(),
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Embed the logo as an RGB image, with a soft mask when it has
/// transparency.
fn embed_logo(document: &mut Document, logo: &LogoImage) -> Result<EmbeddedLogo, image::ImageError> {
    let decoded = image::load_from_memory(&logo.bytes)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    let mut alpha = Vec::with_capacity(width as usize * height as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if alpha.iter().any(|a| *a < u8::MAX) {
        let mut mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        );
        compress(&mut mask, "logo mask");
        let mask_id = document.add_object(mask);
        dict.set("SMask", mask_id);
    }

    let mut stream = Stream::new(dict, rgb);
    compress(&mut stream, "logo");
    let id = document.add_object(stream);
    debug!("embedded {width}x{height} logo as {id:?}");

    Ok(EmbeddedLogo {
        id,
        width_px: width,
        height_px: height,
    })
}

fn compress(stream: &mut Stream, what: &str) {
    if let Err(e) = stream.compress() {
        debug!("{what} stream left uncompressed: {e}");
    }
}

/// The resources that apply to a page, including ones inherited from the
/// page tree, as an owned dictionary.
fn effective_resources(document: &Document, page_id: ObjectId) -> Result<Dictionary, lopdf::Error> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        let dict = document.get_dictionary(id)?;
        if let Ok(resources) = dict.get(b"Resources") {
            if let (_, Object::Dictionary(resources)) = document.dereference(resources)? {
                return Ok(resources.clone());
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 32 {
            break;
        }
    }
    Ok(Dictionary::new())
}

/// Give the page its own resource dictionary with the given entries added.
/// Shared dictionaries are copied, never modified.
fn register_resources(
    document: &mut Document,
    page_id: ObjectId,
    entries: &[(&[u8], &str, ObjectId)],
) -> Result<(), lopdf::Error> {
    let mut resources = effective_resources(document, page_id)?;
    for (category, name, id) in entries {
        let mut sub = match resources.get(category) {
            Ok(obj) => match document.dereference(obj)? {
                (_, Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            },
            Err(_) => Dictionary::new(),
        };
        sub.set(*name, Object::Reference(*id));
        resources.set(category.to_vec(), sub);
    }
    document
        .get_dictionary_mut(page_id)?
        .set("Resources", resources);
    Ok(())
}

/// Wrap the laid-out page content in `q`/`Q` and append the decoration so it
/// draws in the default coordinate system.
fn wrap_contents(
    document: &mut Document,
    page_id: ObjectId,
    decoration: Vec<u8>,
) -> Result<(), lopdf::Error> {
    let existing = document.get_page_contents(page_id);

    let save_id = document.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut overlay = b"\nQ\n".to_vec();
    overlay.extend(decoration);
    let mut stream = Stream::new(dictionary! {}, overlay);
    compress(&mut stream, "decoration");
    let overlay_id = document.add_object(stream);

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(existing.into_iter().map(Object::Reference));
    contents.push(Object::Reference(overlay_id));

    document
        .get_dictionary_mut(page_id)?
        .set("Contents", contents);
    Ok(())
}
