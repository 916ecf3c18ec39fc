use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE, PARTIAL_SUFFIX};
use crate::error::{Result, SkyprocError};

/// Keywords describing the data layout; regenerated on every write.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BSCALE", "BZERO", "END",
];

/// Value of a header card.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Str(s) => s.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Bool(true) => write!(f, "{:>20}", "T"),
            HeaderValue::Bool(false) => write!(f, "{:>20}", "F"),
            HeaderValue::Int(v) => write!(f, "{v:>20}"),
            HeaderValue::Float(v) => write!(f, "{:>20}", format_float(*v)),
            HeaderValue::Str(s) => {
                let escaped = s.replace('\'', "''");
                write!(f, "'{escaped:<8}'")
            }
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Str(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Str(v)
    }
}

/// One 80-byte header record. Commentary cards (COMMENT, HISTORY, blank)
/// carry no value.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub key: String,
    pub value: Option<HeaderValue>,
    pub comment: Option<String>,
}

impl Card {
    fn render(&self) -> String {
        let mut line = match &self.value {
            Some(value) => {
                let mut s = format!("{:<8}= {}", self.key, value);
                if let Some(comment) = &self.comment {
                    s.push_str(" / ");
                    s.push_str(comment);
                }
                s
            }
            None => format!(
                "{:<8}{}",
                self.key,
                self.comment.as_deref().unwrap_or_default()
            ),
        };
        line.retain(|c| c.is_ascii() && !c.is_ascii_control());
        line.truncate(FITS_CARD_SIZE);
        format!("{line:<80}")
    }

    fn parse(raw: &[u8]) -> Card {
        let text: String = raw.iter().map(|&b| b as char).collect();
        let key = text.get(..8).unwrap_or(text.as_str()).trim_end().to_string();
        let rest = text.get(8..).unwrap_or("");

        if !rest.starts_with("= ") {
            let comment = rest.trim_end();
            return Card {
                key,
                value: None,
                comment: (!comment.is_empty()).then(|| comment.to_string()),
            };
        }

        let body = rest[2..].trim_start();
        let (value, remainder) = if let Some(quoted) = body.strip_prefix('\'') {
            let mut out = String::new();
            let mut chars = quoted.char_indices().peekable();
            let mut end = quoted.len();
            while let Some((i, c)) = chars.next() {
                if c == '\'' {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        out.push('\'');
                        chars.next();
                        continue;
                    }
                    end = i + 1;
                    break;
                }
                out.push(c);
            }
            (
                Some(HeaderValue::Str(out.trim_end().to_string())),
                &quoted[end.min(quoted.len())..],
            )
        } else {
            let (token, remainder) = match body.find('/') {
                Some(i) => (&body[..i], &body[i..]),
                None => (body, ""),
            };
            (parse_scalar(token.trim()), remainder)
        };

        let comment = remainder
            .trim_start()
            .strip_prefix('/')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Card {
            key,
            value,
            comment,
        }
    }
}

fn parse_scalar(token: &str) -> Option<HeaderValue> {
    match token {
        "" => None,
        "T" => Some(HeaderValue::Bool(true)),
        "F" => Some(HeaderValue::Bool(false)),
        _ => token
            .parse::<i64>()
            .map(HeaderValue::Int)
            .or_else(|_| token.replace(['D', 'd'], "E").parse::<f64>().map(HeaderValue::Float))
            .ok(),
    }
}

fn format_float(v: f64) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let plain = format!("{v}");
    if plain.len() <= 20 && (v == 0.0 || v.abs() >= 1e-4) {
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        format!("{v:.10E}")
    }
}

/// Ordered list of header cards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .and_then(|c| c.value.as_ref())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    /// Set `key`, replacing an existing card in place or appending a new one.
    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>, comment: Option<&str>) {
        let key = key.to_ascii_uppercase();
        let card = Card {
            key: key.clone(),
            value: Some(value.into()),
            comment: comment.map(str::to_string),
        };
        match self.cards.iter_mut().find(|c| c.key == key && c.value.is_some()) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn push_history(&mut self, text: &str) {
        self.cards.push(Card {
            key: "HISTORY".to_string(),
            value: None,
            comment: Some(text.to_string()),
        });
    }

    fn is_structural(key: &str) -> bool {
        STRUCTURAL_KEYS.contains(&key)
    }
}

/// Pixel types that can be written as FITS primary data.
pub trait FitsPixel: Copy {
    const BITPIX: i64;
    fn write_be<W: Write>(self, w: &mut W) -> std::io::Result<()>;
}

impl FitsPixel for f32 {
    const BITPIX: i64 = -32;
    fn write_be<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_f32::<BigEndian>(self)
    }
}

impl FitsPixel for i32 {
    const BITPIX: i64 = 32;
    fn write_be<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_i32::<BigEndian>(self)
    }
}

/// Read the primary image of a FITS file as f32 physical values.
pub fn read_image(path: &Path) -> Result<(Header, Array2<f32>)> {
    let (header, values) = read_primary(path)?;
    Ok((header, values.mapv(|v| v as f32)))
}

/// Read the primary image of a FITS file as integer flags.
pub fn read_mask(path: &Path) -> Result<(Header, Array2<i32>)> {
    let (header, values) = read_primary(path)?;
    Ok((header, values.mapv(|v| if v.is_finite() { v.round() as i32 } else { 0 })))
}

fn read_primary(path: &Path) -> Result<(Header, Array2<f64>)> {
    let file = File::open(path)?;
    // SAFETY: the file is opened read-only and not modified while mapped.
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < FITS_BLOCK_SIZE || !mmap.starts_with(b"SIMPLE  =") {
        return Err(SkyprocError::invalid_fits(path, "missing SIMPLE card"));
    }

    let mut header = Header::new();
    let mut offset = 0;
    loop {
        if offset + FITS_CARD_SIZE > mmap.len() {
            return Err(SkyprocError::invalid_fits(path, "header has no END card"));
        }
        let card = Card::parse(&mmap[offset..offset + FITS_CARD_SIZE]);
        offset += FITS_CARD_SIZE;
        if card.key == "END" {
            break;
        }
        header.cards.push(card);
    }
    let data_start = offset.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;

    let int_key = |key: &str| -> Result<i64> {
        match header.get(key) {
            Some(HeaderValue::Int(v)) => Ok(*v),
            _ => Err(SkyprocError::invalid_fits(path, format!("missing integer {key}"))),
        }
    };
    let bitpix = int_key("BITPIX")?;
    let naxis = int_key("NAXIS")?;
    if naxis < 2 {
        return Err(SkyprocError::invalid_fits(path, format!("NAXIS = {naxis}, expected 2")));
    }
    let width = int_key("NAXIS1")?.max(0) as usize;
    let height = int_key("NAXIS2")?.max(0) as usize;
    for axis in 3..=naxis {
        if int_key(&format!("NAXIS{axis}"))? != 1 {
            return Err(SkyprocError::invalid_fits(path, "only 2D images are supported"));
        }
    }
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);

    let bytes = match bitpix {
        8 => 1,
        16 => 2,
        32 | -32 => 4,
        64 | -64 => 8,
        other => {
            return Err(SkyprocError::invalid_fits(path, format!("unsupported BITPIX {other}")))
        }
    };
    let (n, end) = width
        .checked_mul(height)
        .and_then(|n| Some((n, data_start.checked_add(n.checked_mul(bytes)?)?)))
        .ok_or_else(|| {
            SkyprocError::invalid_fits(path, format!("image size {width}x{height} overflows"))
        })?;
    if mmap.len() < end {
        return Err(SkyprocError::invalid_fits(
            path,
            format!("data truncated: expected {} bytes, got {}", end, mmap.len()),
        ));
    }
    let raw = &mmap[data_start..end];

    let values: Vec<f64> = (0..n)
        .map(|i| {
            let chunk = &raw[i * bytes..(i + 1) * bytes];
            let v = match bitpix {
                8 => chunk[0] as f64,
                16 => BigEndian::read_i16(chunk) as f64,
                32 => BigEndian::read_i32(chunk) as f64,
                64 => BigEndian::read_i64(chunk) as f64,
                -32 => BigEndian::read_f32(chunk) as f64,
                _ => BigEndian::read_f64(chunk),
            };
            bzero + bscale * v
        })
        .collect();

    let data = Array2::from_shape_vec((height, width), values)
        .map_err(|e| SkyprocError::invalid_fits(path, e.to_string()))?;

    header.cards.retain(|c| !Header::is_structural(&c.key));
    Ok((header, data))
}

/// Write `data` as the primary image of a new FITS file.
///
/// The file is written next to `path` under a temporary name and renamed into
/// place once complete, so readers never observe a partial file.
pub fn write_primary<T: FitsPixel>(path: &Path, data: &Array2<T>, header: &Header) -> Result<()> {
    let tmp = partial_path(path);
    let result = write_to(&tmp, data, header).and_then(|_| Ok(fs::rename(&tmp, path)?));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Temporary name used while `path` is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn write_to<T: FitsPixel>(path: &Path, data: &Array2<T>, header: &Header) -> Result<()> {
    let (h, w) = data.dim();
    let mut writer = BufWriter::new(File::create(path)?);

    let mut cards = vec![
        Card {
            key: "SIMPLE".into(),
            value: Some(HeaderValue::Bool(true)),
            comment: Some("conforms to FITS standard".into()),
        },
        Card {
            key: "BITPIX".into(),
            value: Some(HeaderValue::Int(T::BITPIX)),
            comment: Some("array data type".into()),
        },
        Card {
            key: "NAXIS".into(),
            value: Some(HeaderValue::Int(2)),
            comment: None,
        },
        Card {
            key: "NAXIS1".into(),
            value: Some(HeaderValue::Int(w as i64)),
            comment: None,
        },
        Card {
            key: "NAXIS2".into(),
            value: Some(HeaderValue::Int(h as i64)),
            comment: None,
        },
        Card {
            key: "EXTEND".into(),
            value: Some(HeaderValue::Bool(true)),
            comment: None,
        },
    ];
    cards.extend(
        header
            .cards
            .iter()
            .filter(|c| !Header::is_structural(&c.key))
            .cloned(),
    );

    let mut written = 0;
    for card in &cards {
        writer.write_all(card.render().as_bytes())?;
        written += FITS_CARD_SIZE;
    }
    writer.write_all(format!("{:<80}", "END").as_bytes())?;
    written += FITS_CARD_SIZE;
    pad(&mut writer, written, b' ')?;

    for &v in data.iter() {
        v.write_be(&mut writer)?;
    }
    pad(&mut writer, h * w * std::mem::size_of::<T>(), 0)?;

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn pad(w: &mut impl Write, written: usize, fill: u8) -> Result<()> {
    let rem = written % FITS_BLOCK_SIZE;
    if rem != 0 {
        w.write_all(&vec![fill; FITS_BLOCK_SIZE - rem])?;
    }
    Ok(())
}
