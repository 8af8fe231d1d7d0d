use crate::config::PrepConfig;
use crate::error::Result;

use regex::Regex;

/// Per-sentence token filter: lowercase, keep word-shaped tokens, map pure
/// numbers to a placeholder.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    lower: bool,
    word_re: Regex,
    number_re: Option<Regex>,
    number_token: String,
}

impl Preprocessor {

    pub fn new(params: &PrepConfig) -> Result<Preprocessor> {

        // patterns must match from the first character of the token; their own `$` anchors the end
        let word_re = Regex::new(&format!("^(?:{})", params.word_pattern))?;
        let number_re = if params.map_numbers { Some(Regex::new(r"^\d+$")?) } else { None };

        Ok(Preprocessor {
            lower: params.lower,
            word_re,
            number_re,
            number_token: params.number_token.to_owned(),
        })
    }

    pub fn prep_sent<S: AsRef<str>>(&self, sent: &[S]) -> Vec<String> {
        sent.iter().filter_map(|w| self.prep_word(w.as_ref())).collect()
    }

    fn prep_word(&self, word: &str) -> Option<String> {

        // the placeholder is reserved, it survives any further pass untouched
        if self.number_re.is_some() && word == self.number_token {
            return Some(word.to_owned());
        }

        let word = if self.lower { word.to_lowercase() } else { word.to_owned() };
        if !self.word_re.is_match(&word) {
            return None;
        }
        match &self.number_re {
            Some(number_re) if number_re.is_match(&word) => Some(self.number_token.to_owned()),
            _ => Some(word),
        }
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    fn default_prep() -> Preprocessor {
        Preprocessor::new(&PrepConfig::default()).unwrap()
    }

    #[test]
    fn lowercases_filters_and_maps_numbers() {
        let prep = default_prep();
        let sent = ["Presiden", "Joko", ",", "1998", "tahun-tahun", "Rp5.000", "\"", "20an"];
        assert_eq!(prep.prep_sent(&sent), vec!["presiden", "joko", "@@NUM@@", "tahun-tahun", "20an"]);
    }

    #[test]
    fn every_digit_token_becomes_the_placeholder() {
        let prep = default_prep();
        for token in ["0", "7", "2014", "000123", "99999999999999999999"] {
            assert_eq!(prep.prep_sent(&[token]), vec!["@@NUM@@"]);
        }
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let prep = default_prep();
        let sentences: Vec<Vec<&str>> = vec![
            vec!["Pada", "2005", ",", "KPK", "menahan", "3", "orang", "."],
            vec!["@@NUM@@", "ÉCOLE", "Straße", "x-ray", "a/b"],
            vec![],
        ];
        for sent in sentences {
            let once = prep.prep_sent(&sent);
            assert_eq!(prep.prep_sent(&once), once);
        }
    }

    #[test]
    fn options_can_be_switched_off() {
        let params = PrepConfig { lower: false, map_numbers: false, ..PrepConfig::default() };
        let prep = Preprocessor::new(&params).unwrap();
        assert_eq!(prep.prep_sent(&["Jakarta", "2019", "?"]), vec!["Jakarta", "2019"]);
    }

    #[test]
    fn pattern_is_anchored_at_the_start() {
        // a suffix match would accept "...kata"
        let prep = default_prep();
        assert!(prep.prep_sent(&["...kata"]).is_empty());

        let params = PrepConfig { word_pattern: "[a-z]+".to_string(), ..PrepConfig::default() };
        let prep = Preprocessor::new(&params).unwrap();
        // without `$` only the start is pinned
        assert_eq!(prep.prep_sent(&["abc!", "!abc"]), vec!["abc!"]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let params = PrepConfig { word_pattern: "[unclosed".to_string(), ..PrepConfig::default() };
        assert!(Preprocessor::new(&params).is_err());
    }
}
