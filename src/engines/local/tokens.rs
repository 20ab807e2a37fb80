use std::collections::HashMap;
use std::path::Path;

use super::error::LocalEngineError;

/// Symbol table mapping model input symbols to token IDs.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    ids: HashMap<String, i64>,
}

impl TokenTable {
    /// Load a `tokens.txt` file: one `<symbol> <id>` pair per line.
    ///
    /// The symbol may itself be a space, so each line is split on its last
    /// space and an empty symbol stands for `" "`.
    pub fn load(path: &Path) -> Result<Self, LocalEngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, LocalEngineError> {
        let mut ids = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (symbol, id) = line.rsplit_once(' ').ok_or_else(|| {
                LocalEngineError::Tokens(format!("line {}: expected '<symbol> <id>'", line_no + 1))
            })?;
            let id = id.trim().parse::<i64>().map_err(|_| {
                LocalEngineError::Tokens(format!("line {}: non-integer id {id:?}", line_no + 1))
            })?;
            let symbol = if symbol.is_empty() { " " } else { symbol };
            ids.insert(symbol.to_string(), id);
        }

        if ids.is_empty() {
            return Err(LocalEngineError::Tokens("no tokens defined".to_string()));
        }

        log::debug!("Loaded {} tokens", ids.len());
        Ok(Self { ids })
    }

    pub fn get(&self, symbol: &str) -> Option<i64> {
        self.ids.get(symbol).copied()
    }

    pub fn get_char(&self, ch: char) -> Option<i64> {
        let mut buf = [0u8; 4];
        self.get(ch.encode_utf8(&mut buf))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Piper-style framing: `^`, each id followed by the `_` pad, then `$`.
    ///
    /// Tables without those three symbols are returned unchanged.
    pub fn intersperse(&self, ids: &[i64]) -> Vec<i64> {
        let (Some(bos), Some(eos), Some(pad)) = (self.get("^"), self.get("$"), self.get("_"))
        else {
            return ids.to_vec();
        };

        let mut framed = Vec::with_capacity(ids.len() * 2 + 3);
        framed.push(bos);
        framed.push(pad);
        for &id in ids {
            framed.push(id);
            framed.push(pad);
        }
        framed.push(eos);
        framed
    }
}

/// Word-to-symbols dictionary for lexicon-based models.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    words: HashMap<String, Vec<String>>,
}

impl Lexicon {
    /// Load a lexicon file: `<word> <symbol> <symbol> ...` per line.
    pub fn load(path: &Path) -> Result<Self, LocalEngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, LocalEngineError> {
        let mut words = HashMap::new();
        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let symbols: Vec<String> = fields.map(str::to_string).collect();
            if symbols.is_empty() {
                return Err(LocalEngineError::Lexicon(format!(
                    "word {word:?} has no pronunciation"
                )));
            }
            // First pronunciation wins.
            words.entry(word.to_lowercase()).or_insert(symbols);
        }
        log::debug!("Loaded lexicon with {} words", words.len());
        Ok(Self { words })
    }

    pub fn pronounce(&self, word: &str) -> Option<&[String]> {
        self.words.get(&word.to_lowercase()).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_symbol_and_ids() {
        let table = TokenTable::parse("_ 0\n^ 1\n$ 2\n  3\na 14\nə 59\n").unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.get(" "), Some(3));
        assert_eq!(table.get_char('ə'), Some(59));
        assert_eq!(table.get("z"), None);
    }

    #[test]
    fn rejects_non_integer_ids() {
        assert!(matches!(
            TokenTable::parse("a x\n"),
            Err(LocalEngineError::Tokens(_))
        ));
        assert!(matches!(TokenTable::parse("\n\n"), Err(LocalEngineError::Tokens(_))));
    }

    #[test]
    fn intersperses_piper_padding() {
        let table = TokenTable::parse("_ 0\n^ 1\n$ 2\na 14\nb 15\n").unwrap();
        assert_eq!(table.intersperse(&[14, 15]), vec![1, 0, 14, 0, 15, 0, 2]);
    }

    #[test]
    fn leaves_ids_alone_without_framing_symbols() {
        let table = TokenTable::parse("a 1\nb 2\n").unwrap();
        assert_eq!(table.intersperse(&[1, 2]), vec![1, 2]);
    }

    #[test]
    fn lexicon_lookup_is_case_insensitive() {
        let lexicon = Lexicon::parse("hello HH AH0 L OW1\nworld W ER1 L D\nHello X\n").unwrap();
        assert_eq!(
            lexicon.pronounce("HELLO").unwrap(),
            &["HH", "AH0", "L", "OW1"].map(String::from)
        );
        assert!(lexicon.pronounce("missing").is_none());
    }
}
