//! Phoneme conversion and token-id encoding.
//!
//! Text is turned into an IPA string by a [`Phonemizer`], then every symbol is
//! looked up in the model vocabulary ([`SymbolTable`]). The id sequence is
//! framed by the pad id on both ends, which the model uses as start and end
//! markers.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::PhonemizeError;

/// Id of the pad symbol, also used as start and end sentinel
pub const PAD_ID: i64 = 0;

const PAD: &str = "$";
const PUNCTUATION: &str = ";:,.!?¡¿—…\"«»“” ";
/// Marks restored after phonemization (the vocabulary punctuation minus space)
const KEPT_PUNCTUATION: &str = ";:,.!?¡¿—…\"«»“”";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const LETTERS_IPA: &str = "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘'̩'ᵻ";

/// Fixed symbol → id vocabulary shared with the synthesis model.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    ids: HashMap<char, i64>,
    len: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        let symbols = PAD
            .chars()
            .chain(PUNCTUATION.chars())
            .chain(LETTERS.chars())
            .chain(LETTERS_IPA.chars());

        let mut ids = HashMap::new();
        let mut len = 0usize;
        for (index, symbol) in symbols.enumerate() {
            // a symbol listed twice keeps its last position
            ids.insert(symbol, index as i64);
            len = index + 1;
        }
        Self { ids, len }
    }

    pub fn id(&self, symbol: char) -> Option<i64> {
        self.ids.get(&symbol).copied()
    }

    /// Number of table positions (vocabulary size of the model)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Map symbols to ids, dropping anything outside the vocabulary.
    pub fn ids_for(&self, phonemes: &str) -> Vec<i64> {
        phonemes.chars().filter_map(|c| self.id(c)).collect()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Phonemizer: Send + Sync {
    fn name(&self) -> &str;
    fn phonemize(&self, text: &str) -> Result<String, PhonemizeError>;
}

/// Runs `espeak-ng` (or a compatible binary) to produce IPA.
#[derive(Debug, Clone)]
pub struct EspeakPhonemizer {
    program: String,
    voice: String,
}

impl EspeakPhonemizer {
    pub fn new(program: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            voice: voice.into(),
        }
    }
}

impl EspeakPhonemizer {
    // text goes over stdin so a leading '-' is never read as a flag
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["-q", "--ipa", "-v", &self.voice, "--stdin"]);
        command
    }
}

impl Default for EspeakPhonemizer {
    fn default() -> Self {
        Self::new("espeak-ng", "en-us")
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn name(&self) -> &str {
        &self.program
    }

    fn phonemize(&self, text: &str) -> Result<String, PhonemizeError> {
        let spawn_error = |source: std::io::Error| PhonemizeError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).map_err(spawn_error)?;
        }
        let output = child.wait_with_output().map_err(spawn_error)?;

        if !output.status.success() {
            return Err(PhonemizeError::Failed {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // espeak prints one line per clause
        let ipa = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if ipa.is_empty() {
            return Err(PhonemizeError::Empty);
        }
        Ok(ipa)
    }
}

/// Digraph and vowel substitution. Deterministic and lossy, not phonetically
/// accurate; only used when a real phonemizer is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPhonemizer;

impl RuleBasedPhonemizer {
    const RULES: [(&'static str, &'static str); 10] = [
        ("ph", "f"),
        ("ch", "tʃ"),
        ("sh", "ʃ"),
        ("th", "θ"),
        ("ng", "ŋ"),
        ("a", "ə"),
        ("e", "ɛ"),
        ("i", "ɪ"),
        ("o", "ɔ"),
        ("u", "ʊ"),
    ];

    pub fn approximate(text: &str) -> String {
        Self::RULES
            .iter()
            .fold(text.to_lowercase(), |acc, (from, to)| acc.replace(from, to))
    }
}

impl Phonemizer for RuleBasedPhonemizer {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn phonemize(&self, text: &str) -> Result<String, PhonemizeError> {
        Ok(Self::approximate(text))
    }
}

/// Text → token id encoder.
pub struct Encoder {
    phonemizer: Box<dyn Phonemizer>,
    table: SymbolTable,
}

impl Encoder {
    pub fn new(phonemizer: Box<dyn Phonemizer>) -> Self {
        Self {
            phonemizer,
            table: SymbolTable::new(),
        }
    }

    /// Encoder backed by espeak-ng, falling back to the rule-based approximation
    pub fn espeak() -> Self {
        Self::new(Box::new(EspeakPhonemizer::default()))
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Phoneme string for `text`, using the fallback when the phonemizer fails.
    ///
    /// Punctuation marks are carried over verbatim, since phonemizers drop
    /// them and the model reads them as pause and intonation cues.
    pub fn phonemes(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        match self.phonemize_keeping_punctuation(text) {
            Ok(ipa) => ipa,
            Err(e) => {
                warn!(
                    "Phonemizer '{}' failed ({e}), using rule-based approximation",
                    self.phonemizer.name()
                );
                RuleBasedPhonemizer::approximate(text)
            }
        }
    }

    /// Phonemize the runs between punctuation marks and put the marks back.
    fn phonemize_keeping_punctuation(&self, text: &str) -> Result<String, PhonemizeError> {
        let mut out = String::with_capacity(text.len() * 2);
        let mut run = String::new();
        for ch in text.chars() {
            if KEPT_PUNCTUATION.contains(ch) {
                self.push_run(&mut out, &run)?;
                run.clear();
                out.push(ch);
            } else {
                run.push(ch);
            }
        }
        self.push_run(&mut out, &run)?;
        Ok(out)
    }

    fn push_run(&self, out: &mut String, run: &str) -> Result<(), PhonemizeError> {
        let words = run.trim();
        if words.is_empty() {
            return Ok(());
        }
        if !out.is_empty() && run.starts_with(char::is_whitespace) {
            out.push(' ');
        }
        out.push_str(&self.phonemizer.phonemize(words)?);
        Ok(())
    }

    /// Token ids for `text`, framed by start and end sentinels.
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let phonemes = self.phonemes(text);
        let mut ids = Vec::with_capacity(phonemes.chars().count() + 2);
        ids.push(PAD_ID);
        ids.extend(self.table.ids_for(&phonemes));
        ids.push(PAD_ID);
        debug!("Encoded {} chars into {} token ids", text.len(), ids.len());
        ids
    }
}
