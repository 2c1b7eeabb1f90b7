use log::{debug, info};
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use serde::de::{self, SeqAccess};
use serde::{Deserialize, Deserializer as _};
use serde_json::Value;
use std::cell::Cell;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::errors::{ExtractionError, Result};
use crate::pipeline::Game;

/// Label field used by the game-collection exports
pub const DEFAULT_LABEL_FIELD: &str = "opponentIsComp";

/// Label given to games whose record has no label field (inference only)
pub const UNKNOWN_LABEL: i64 = -1;

#[derive(Deserialize)]
#[serde(untagged)]
enum MoveList {
    Tokens(Vec<String>),
    Text(String),
}

impl MoveList {
    fn into_tokens(self) -> Vec<String> {
        match self {
            MoveList::Tokens(tokens) => tokens,
            MoveList::Text(text) => text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// On-disk layout of a corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// JSON array or JSON lines, told apart by the first byte
    Json,
    /// PGN games; the label comes from a header tag
    Pgn,
}

impl CorpusFormat {
    /// `.pgn` files are PGN, anything else is read as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("pgn") => CorpusFormat::Pgn,
            _ => CorpusFormat::Json,
        }
    }
}

impl FromStr for CorpusFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Ok(CorpusFormat::Json),
            "pgn" => Ok(CorpusFormat::Pgn),
            other => Err(format!("unknown corpus format {other:?} (expected json or pgn)")),
        }
    }
}

/// Loads `(moves, label)` corpora from JSON, JSON-lines or PGN files
///
/// Each JSON record needs a `moves` field, either a list of SAN tokens or one
/// whitespace-separated string. PGN games take their label from the header
/// tag named by `label_field`.
pub struct CorpusLoader {
    pub label_field: String,
    pub default_label: i64,
    /// Keep only games with `min < plies < max`
    pub length_filter: Option<(usize, usize)>,
    /// Forced layout; `None` picks one from the file extension
    pub format: Option<CorpusFormat>,
    pub loaded_count: usize,
    pub filtered_count: usize,
}

impl Default for CorpusLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusLoader {
    pub fn new() -> Self {
        Self {
            label_field: DEFAULT_LABEL_FIELD.to_string(),
            default_label: UNKNOWN_LABEL,
            length_filter: None,
            format: None,
            loaded_count: 0,
            filtered_count: 0,
        }
    }

    pub fn with_label_field(mut self, field: impl Into<String>) -> Self {
        self.label_field = field.into();
        self
    }

    pub fn with_default_label(mut self, label: i64) -> Self {
        self.default_label = label;
        self
    }

    pub fn with_length_filter(mut self, min_plies: usize, max_plies: usize) -> Self {
        self.length_filter = Some((min_plies, max_plies));
        self
    }

    pub fn with_format(mut self, format: CorpusFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn load_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<Game>> {
        let path = path.as_ref();
        let format = self.format.unwrap_or_else(|| CorpusFormat::from_path(path));
        debug!("loading {format:?} corpus from {}", path.display());
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(64 * 1024, file); // 64KB buffer
        match format {
            CorpusFormat::Json => self.load_reader(reader),
            CorpusFormat::Pgn => self.load_pgn_reader(reader),
        }
    }

    /// Detects the layout from the first non-whitespace byte: `[` means a
    /// JSON array, anything else JSON lines
    pub fn load_reader<R: BufRead>(&mut self, mut reader: R) -> Result<Vec<Game>> {
        let records = match first_significant_byte(&mut reader)? {
            None => Vec::new(),
            Some(b'[') => read_json_array(reader)?,
            Some(_) => read_json_lines(reader)?,
        };

        let mut games = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let game = self.parse_record(index, record)?;
            self.keep(&mut games, game);
        }
        Ok(self.finish(games))
    }

    /// Read PGN games, skipping variations and comments
    ///
    /// Record indices in errors count games from zero.
    pub fn load_pgn_reader<R: Read>(&mut self, reader: R) -> Result<Vec<Game>> {
        let mut collector = PgnCollector::new(self.label_field.as_bytes());
        let mut reader = BufferedReader::new(reader);
        let mut games = Vec::new();
        let mut index = 0;

        while let Some((moves, label)) = reader.read_game(&mut collector)? {
            let label = match label {
                None => self.default_label,
                Some(text) => {
                    let value = Value::String(text);
                    parse_label(&value).ok_or_else(|| ExtractionError::InvalidRecord {
                        index,
                        reason: format!("unrecognised `{}` header {value}", self.label_field),
                    })?
                }
            };
            self.keep(&mut games, Game { moves, label });
            index += 1;
        }
        Ok(self.finish(games))
    }

    fn keep(&mut self, games: &mut Vec<Game>, game: Game) {
        if let Some((min, max)) = self.length_filter {
            if !(min < game.plies() && game.plies() < max) {
                self.filtered_count += 1;
                return;
            }
        }
        games.push(game);
    }

    fn finish(&mut self, games: Vec<Game>) -> Vec<Game> {
        self.loaded_count += games.len();
        info!(
            "loaded {} games ({} filtered by length)",
            games.len(),
            self.filtered_count
        );
        games
    }

    fn parse_record(&self, index: usize, mut record: Value) -> Result<Game> {
        let invalid = |reason: String| ExtractionError::InvalidRecord { index, reason };

        let object = record
            .as_object_mut()
            .ok_or_else(|| invalid("record is not a JSON object".to_string()))?;
        let moves = object
            .remove("moves")
            .ok_or_else(|| invalid("missing `moves` field".to_string()))?;
        let moves: MoveList = serde_json::from_value(moves)
            .map_err(|_| invalid("`moves` must be a string or a list of strings".to_string()))?;

        let label = match object.get(&self.label_field) {
            None => self.default_label,
            Some(value) => parse_label(value).ok_or_else(|| {
                invalid(format!("unrecognised `{}` value {value}", self.label_field))
            })?,
        };

        Ok(Game {
            moves: moves.into_tokens(),
            label,
        })
    }
}

/// Interpret a label value: integers as-is, booleans and Yes/No as 0/1,
/// empty and null as 0
pub fn parse_label(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(text) => match text.trim() {
            "" => Some(0),
            t if t.eq_ignore_ascii_case("yes") || t.eq_ignore_ascii_case("true") => Some(1),
            t if t.eq_ignore_ascii_case("no") || t.eq_ignore_ascii_case("false") => Some(0),
            t => t.parse().ok(),
        },
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn first_significant_byte<R: BufRead>(reader: &mut R) -> Result<Option<u8>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if skip < buf.len() {
            let first = buf[skip];
            reader.consume(skip);
            return Ok(Some(first));
        }
        let consumed = buf.len();
        reader.consume(consumed);
    }
}

/// Deserialize a JSON array one element at a time so a syntax error can be
/// reported against the record it occurs in
fn read_json_array<R: Read>(reader: R) -> Result<Vec<Value>> {
    let parsed = Cell::new(0);
    let in_record = |err: serde_json::Error| {
        if err.is_io() {
            ExtractionError::Json(err)
        } else {
            ExtractionError::InvalidRecord {
                index: parsed.get(),
                reason: err.to_string(),
            }
        }
    };

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let records = (&mut deserializer)
        .deserialize_seq(RecordSeq { parsed: &parsed })
        .map_err(in_record)?;
    deserializer.end().map_err(in_record)?;
    Ok(records)
}

struct RecordSeq<'a> {
    parsed: &'a Cell<usize>,
}

impl<'de> de::Visitor<'de> for RecordSeq<'_> {
    type Value = Vec<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of game records")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut records = Vec::new();
        while let Some(record) = seq.next_element::<Value>()? {
            records.push(record);
            self.parsed.set(records.len());
        }
        Ok(records)
    }
}

/// Collects the SAN tokens and the label header of each PGN game
struct PgnCollector {
    label_field: Vec<u8>,
    moves: Vec<String>,
    label: Option<String>,
}

impl PgnCollector {
    fn new(label_field: &[u8]) -> Self {
        Self {
            label_field: label_field.to_vec(),
            moves: Vec::new(),
            label: None,
        }
    }
}

impl Visitor for PgnCollector {
    type Result = (Vec<String>, Option<String>);

    fn begin_game(&mut self) {
        self.moves.clear();
        self.label = None;
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        if key == self.label_field.as_slice() {
            self.label = Some(value.decode_utf8_lossy().into_owned());
        }
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.moves.push(san_plus.san.to_string());
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // mainline only
    }

    fn end_game(&mut self) -> Self::Result {
        (std::mem::take(&mut self.moves), self.label.take())
    }
}

fn read_json_lines<R: BufRead>(reader: R) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|err| ExtractionError::InvalidRecord {
            index: records.len(),
            reason: err.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}
