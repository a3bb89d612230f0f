use std::collections::HashMap;
use std::path::Path;

use crate::error::AlignmentError;

/// Phoneme inventory of the acoustic model. Line index of the vocabulary
/// file is the class id; `<...>` symbols are special tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeVocab {
    symbols: Vec<String>,
    ids: HashMap<String, usize>,
    /// `ppg_columns[class]` is the PPG column of a real phoneme class.
    ppg_columns: Vec<Option<usize>>,
    unk_id: Option<usize>,
}

impl PhonemeVocab {
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read vocab", e))?;
        let symbols: Vec<String> = data.lines().map(|l| l.trim().to_string()).collect();
        let symbols = trim_trailing_empty(symbols);
        if symbols.is_empty() {
            return Err(AlignmentError::invalid_input(format!(
                "vocabulary file {} is empty",
                path.display()
            )));
        }
        Ok(Self::from_symbols(symbols))
    }

    pub fn from_symbols<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Self {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let mut ids = HashMap::with_capacity(symbols.len());
        let mut ppg_columns = Vec::with_capacity(symbols.len());
        let mut next_col = 0usize;
        for (id, sym) in symbols.iter().enumerate() {
            // First occurrence wins for duplicated lines.
            ids.entry(sym.clone()).or_insert(id);
            if is_special(sym) {
                ppg_columns.push(None);
            } else {
                ppg_columns.push(Some(next_col));
                next_col += 1;
            }
        }
        let unk_id = ids.get("<unk>").copied();
        Self {
            symbols,
            ids,
            ppg_columns,
            unk_id,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn id(&self, symbol: &str) -> Option<usize> {
        self.ids.get(symbol).copied()
    }

    pub fn symbol(&self, id: usize) -> Option<&str> {
        self.symbols.get(id).map(String::as_str)
    }

    pub fn is_special_id(&self, id: usize) -> bool {
        matches!(self.ppg_columns.get(id), Some(None))
    }

    /// Number of real phoneme classes, i.e. PPG width.
    pub fn phoneme_dim(&self) -> usize {
        self.ppg_columns.iter().flatten().count()
    }

    pub fn ppg_column(&self, id: usize) -> Option<usize> {
        self.ppg_columns.get(id).copied().flatten()
    }

    /// Resolves one phoneme symbol, mapping unknown symbols to `<unk>` (or
    /// class 0 when the vocabulary has none).
    pub fn resolve(&self, symbol: &str) -> usize {
        match self.id(symbol) {
            Some(id) => id,
            None => {
                tracing::debug!(symbol, "phoneme not in vocabulary, using unknown class");
                self.unk_id.unwrap_or(0)
            }
        }
    }

    pub fn tokenize<S: AsRef<str>>(&self, phonemes: &[S]) -> Vec<usize> {
        phonemes.iter().map(|p| self.resolve(p.as_ref())).collect()
    }
}

fn is_special(symbol: &str) -> bool {
    symbol.len() > 2 && symbol.starts_with('<') && symbol.ends_with('>')
}

fn trim_trailing_empty(mut symbols: Vec<String>) -> Vec<String> {
    while symbols.last().is_some_and(|s| s.is_empty()) {
        symbols.pop();
    }
    symbols
}

/// Splits interval text into phoneme symbols.
pub fn split_phonemes(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> PhonemeVocab {
        PhonemeVocab::from_symbols(["<pad>", "<unk>", "sil", "k", "a", "i"])
    }

    #[test]
    fn special_tokens_are_excluded_from_ppg() {
        let v = vocab();
        assert_eq!(v.len(), 6);
        assert_eq!(v.phoneme_dim(), 4);
        assert!(v.is_special_id(0));
        assert!(v.is_special_id(1));
        assert!(!v.is_special_id(2));
        assert_eq!(v.ppg_column(0), None);
        assert_eq!(v.ppg_column(2), Some(0));
        assert_eq!(v.ppg_column(5), Some(3));
        assert_eq!(v.ppg_column(99), None);
    }

    #[test]
    fn tokenize_maps_unknown_to_unk() {
        let v = vocab();
        assert_eq!(v.tokenize(&["sil", "k", "zz", "a"]), vec![2, 3, 1, 4]);
        let no_unk = PhonemeVocab::from_symbols(["sil", "a"]);
        assert_eq!(no_unk.resolve("q"), 0);
    }

    #[test]
    fn lone_angle_brackets_are_regular_symbols() {
        let v = PhonemeVocab::from_symbols(["<>", "a"]);
        assert_eq!(v.phoneme_dim(), 2);
    }

    #[test]
    fn split_phonemes_on_whitespace() {
        assert_eq!(split_phonemes(" k  a\ti "), vec!["k", "a", "i"]);
        assert!(split_phonemes("   ").is_empty());
    }

    #[test]
    fn load_from_plain_text_file() {
        let path = std::env::temp_dir().join("phoneme_aligner_vocab_load.txt");
        std::fs::write(&path, "<pad>\nsil\nk\na\n\n").expect("write vocab");
        let v = PhonemeVocab::load(&path).expect("vocab loads");
        assert_eq!(v.len(), 4);
        assert_eq!(v.id("a"), Some(3));
        assert_eq!(v.symbol(1), Some("sil"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(PhonemeVocab::load(Path::new("/nonexistent/vocab.txt")).is_err());
    }
}
