// sc_man.rs — script scanner for declarative text lumps
//
// Tokenizer used by MAPINFO and friends. Case-insensitive keywords,
// "quoted strings", // and /* */ comments, and an optional C mode where
// punctuation characters split off as their own tokens (needed for the
// comma-separated argument lists of special actions).
//
// Malformed input is fatal to the whole load: every must_* accessor
// returns a ParseError carrying the source name and line so the operator
// can fix the lump.

use thiserror::Error;

const MAX_TOKEN_CHARS: usize = 1024;

/// A fatal script error. Aborts the load of the lump being parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("script error, \"{script}\" line {line}: {message}")]
pub struct ParseError {
    /// Name of the lump or file being parsed.
    pub script: String,
    pub line: u32,
    pub message: String,
}

// Characters that always form single-character tokens.
const SPECIAL: &[u8] = b"{}=";
// Additional single-character tokens in C mode.
const C_SPECIAL: &[u8] = b",;:()[]";

/// Stateful scanner over one text chunk.
pub struct Scanner<'a> {
    source: String,
    data: &'a [u8],
    pos: usize,
    line: u32,
    c_mode: bool,
    ungot: bool,
    saved: Option<(String, bool)>,

    /// The most recently scanned token.
    pub string: String,
    /// Filled by must_get_number / check_number.
    pub number: i32,
    /// Filled by must_get_float / check_float.
    pub float: f32,
    /// True when the current token came from a quoted string.
    pub quoted: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, text: &'a str) -> Self {
        Self {
            source: source.to_string(),
            data: text.as_bytes(),
            pos: 0,
            line: 1,
            c_mode: false,
            ungot: false,
            saved: None,
            string: String::new(),
            number: 0,
            float: 0.0,
            quoted: false,
        }
    }

    pub fn set_c_mode(&mut self, on: bool) {
        self.c_mode = on;
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Build a fatal error at the current position.
    pub fn script_error(&self, message: &str) -> ParseError {
        ParseError {
            script: self.source.clone(),
            line: self.line,
            message: message.to_string(),
        }
    }

    fn is_special(&self, c: u8) -> bool {
        SPECIAL.contains(&c) || (self.c_mode && C_SPECIAL.contains(&c))
    }

    // Skip whitespace and comments. Returns false at end of data.
    fn skip_blanks(&mut self) -> bool {
        loop {
            while self.pos < self.data.len() && self.data[self.pos] <= b' ' {
                if self.data[self.pos] == b'\n' {
                    self.line += 1;
                }
                self.pos += 1;
            }
            if self.pos >= self.data.len() {
                return false;
            }
            if self.data[self.pos] == b'/' && self.pos + 1 < self.data.len() {
                match self.data[self.pos + 1] {
                    b'/' => {
                        while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                            self.pos += 1;
                        }
                        continue;
                    }
                    b'*' => {
                        self.pos += 2;
                        while self.pos + 1 < self.data.len()
                            && !(self.data[self.pos] == b'*' && self.data[self.pos + 1] == b'/')
                        {
                            if self.data[self.pos] == b'\n' {
                                self.line += 1;
                            }
                            self.pos += 1;
                        }
                        self.pos = (self.pos + 2).min(self.data.len());
                        continue;
                    }
                    _ => {}
                }
            }
            return true;
        }
    }

    /// Scan the next token into self.string. Returns false at end of data.
    pub fn get_string(&mut self) -> bool {
        if self.ungot {
            self.ungot = false;
            if let Some((tok, quoted)) = self.saved.clone() {
                self.string = tok;
                self.quoted = quoted;
                return true;
            }
            return false;
        }

        if !self.skip_blanks() {
            self.saved = None;
            return false;
        }

        let mut token = String::new();
        self.quoted = false;

        if self.data[self.pos] == b'"' {
            self.quoted = true;
            self.pos += 1;
            while self.pos < self.data.len() && self.data[self.pos] != b'"' {
                if self.data[self.pos] == b'\n' {
                    self.line += 1;
                }
                if token.len() < MAX_TOKEN_CHARS {
                    token.push(self.data[self.pos] as char);
                }
                self.pos += 1;
            }
            if self.pos < self.data.len() {
                self.pos += 1; // closing quote
            }
        } else if self.is_special(self.data[self.pos]) {
            token.push(self.data[self.pos] as char);
            self.pos += 1;
        } else {
            while self.pos < self.data.len()
                && self.data[self.pos] > b' '
                && !self.is_special(self.data[self.pos])
            {
                if token.len() < MAX_TOKEN_CHARS {
                    token.push(self.data[self.pos] as char);
                }
                self.pos += 1;
            }
        }

        self.string = token.clone();
        self.saved = Some((token, self.quoted));
        true
    }

    /// Like get_string, but end-of-data is an error.
    pub fn must_get_string(&mut self) -> Result<(), ParseError> {
        if self.get_string() {
            Ok(())
        } else {
            Err(self.script_error("missing string (unexpected end of file)"))
        }
    }

    /// Get a string and require it to match `name` (case-insensitive).
    pub fn must_get_string_name(&mut self, name: &str) -> Result<(), ParseError> {
        self.must_get_string()?;
        if !self.compare(name) {
            return Err(self.script_error(&format!("expected '{}', got '{}'", name, self.string)));
        }
        Ok(())
    }

    /// Push the current token back so the next get_string returns it again.
    pub fn un_get(&mut self) {
        self.ungot = true;
    }

    /// Case-insensitive comparison against the current token.
    pub fn compare(&self, text: &str) -> bool {
        self.string.eq_ignore_ascii_case(text)
    }

    /// If the next token equals `text`, consume it. Otherwise push it back.
    pub fn check_string(&mut self, text: &str) -> bool {
        if self.get_string() {
            if self.compare(text) {
                return true;
            }
            self.un_get();
        }
        false
    }

    /// Index of the current token in a keyword table, or None.
    pub fn match_string(&self, strings: &[&str]) -> Option<usize> {
        strings.iter().position(|s| self.compare(s))
    }

    /// Index of the current token in a keyword table; unknown is fatal.
    pub fn must_match_string(&self, strings: &[&str]) -> Result<usize, ParseError> {
        self.match_string(strings)
            .ok_or_else(|| self.script_error(&format!("unknown keyword '{}'", self.string)))
    }

    fn parse_number(token: &str) -> Option<i32> {
        if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).ok().map(|v| v as i32)
        } else {
            token.parse::<i32>().ok()
        }
    }

    /// Get a token and require it to be an integer.
    pub fn must_get_number(&mut self) -> Result<(), ParseError> {
        self.must_get_string()?;
        match Self::parse_number(&self.string) {
            Some(n) => {
                self.number = n;
                Ok(())
            }
            None => Err(self.script_error(&format!("expected a number, got '{}'", self.string))),
        }
    }

    /// If the next token is an integer, consume it into self.number.
    pub fn check_number(&mut self) -> bool {
        if self.get_string() {
            if !self.quoted {
                if let Some(n) = Self::parse_number(&self.string) {
                    self.number = n;
                    return true;
                }
            }
            self.un_get();
        }
        false
    }

    /// Get a token and require it to be a float.
    pub fn must_get_float(&mut self) -> Result<(), ParseError> {
        self.must_get_string()?;
        match self.string.parse::<f32>() {
            Ok(f) => {
                self.float = f;
                Ok(())
            }
            Err(_) => Err(self.script_error(&format!("expected a float, got '{}'", self.string))),
        }
    }
}

/// True when every character of `token` is a decimal digit.
pub fn is_num(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Copy `src` uppercased and truncated to 8 characters, the lump-name rule.
pub fn upper_copy(src: &str) -> String {
    src.chars().take(8).map(|c| c.to_ascii_uppercase()).collect()
}
