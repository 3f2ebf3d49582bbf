//! Interpreter for the subset of the DSS scripting language used to describe
//! distribution circuits.
//!
//! A script is a sequence of commands, one per line:
//!
//! ```txt
//! clear
//! new circuit.feeder basekv=12.47 pu=1.0 bus1=sourcebus
//! redirect lines.dss
//! new load.l1 bus1=650.1 phases=1 kw=100 kvar=40
//! ~ daily=residential
//! ```
//!
//! Interpreting a script yields element [`Definition`]s in the order they
//! were first declared. Definitions are untyped; see `circuit` for how they
//! are turned into a circuit model.
use anyhow::{bail, format_err, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A declared circuit element and its properties in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub class: String,
    pub name: String,
    pub props: Vec<(String, String)>,
}

impl Definition {
    /// Returns the last value assigned to property `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .with_context(|| format!("{}: invalid {}={:?}", self.full_name(), key, v))
            })
            .transpose()
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("{}: invalid {}={:?}", self.full_name(), key, v))
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| match v.trim().to_lowercase().as_str() {
                "yes" | "y" | "true" | "t" | "1" => Ok(true),
                "no" | "n" | "false" | "f" | "0" => Ok(false),
                _ => Err(format_err!(
                    "{}: invalid {}={:?}",
                    self.full_name(),
                    key,
                    v
                )),
            })
            .transpose()
    }
}

/// The result of interpreting a script.
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub definitions: Vec<Definition>,

    /// Options assigned with `set`, in order.
    pub options: Vec<(String, String)>,

    /// Script directory for each definition, parallel to `definitions`.
    /// Relative file references held in properties resolve against the
    /// directory of the script that last set them.
    pub dirs: Vec<PathBuf>,
}

impl Script {
    /// Returns the last value assigned to option `key` with `set`.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn find(&self, class: &str, name: &str) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.class == class && d.name == name)
    }
}

/// Reads and interprets the script at `path`.
pub fn compile_file(path: &Path) -> Result<Script> {
    let mut interp = Interpreter::default();
    interp.run_file(path, 0)?;
    Ok(interp.script)
}

/// Interprets script `text`; file references resolve against `dir`.
pub fn compile_str(text: &str, dir: &Path) -> Result<Script> {
    let mut interp = Interpreter::default();
    interp.run_str(text, dir, 0)?;
    Ok(interp.script)
}

const MAX_DEPTH: usize = 32;

const IGNORED: &[&str] = &[
    "solve",
    "calcvoltagebases",
    "calcv",
    "show",
    "export",
    "plot",
    "buscoords",
    "sample",
    "makebuslist",
    "closedi",
];

#[derive(Default)]
struct Interpreter {
    script: Script,
    last: Option<usize>,
}

impl Interpreter {
    fn run_file(&mut self, path: &Path, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            bail!("redirect nesting too deep at {}", path.display());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        log::debug!("compiling {}", path.display());
        self.run_str(&text, &parent_dir(path), depth)
            .with_context(|| format!("in {}", path.display()))
    }

    fn run_str(&mut self, text: &str, dir: &Path, depth: usize) -> Result<()> {
        let text = strip_block_comments(text);
        for (n, line) in text.lines().enumerate() {
            self.run_line(line, dir, depth)
                .with_context(|| format!("line {}: {}", n + 1, line.trim()))?;
        }
        Ok(())
    }

    fn run_line(&mut self, line: &str, dir: &Path, depth: usize) -> Result<()> {
        let toks = tokenize(line)?;
        let (verb, rest) = match toks.split_first() {
            Some((Tok::Word(verb), rest)) => (verb.to_lowercase(), rest),
            Some((Tok::Eq, _)) => bail!("unexpected '='"),
            None => return Ok(()),
        };
        let params = params(rest)?;

        match verb.as_str() {
            "clear" => {
                self.script = Script::default();
                self.last = None;
            }
            "new" => self.new_element(params, dir)?,
            "edit" => self.edit_element(params, dir)?,
            "~" | "more" => {
                let i = self
                    .last
                    .ok_or_else(|| format_err!("continuation without a preceding element"))?;
                self.assign(i, params)?;
            }
            "redirect" | "compile" => {
                let file = params
                    .into_iter()
                    .next()
                    .map(|(_, v)| v)
                    .ok_or_else(|| format_err!("{} requires a file name", verb))?;
                self.run_file(&dir.join(file), depth + 1)?;
            }
            "set" => {
                for (key, value) in params {
                    let key = key.ok_or_else(|| format_err!("set requires key=value"))?;
                    log::debug!("set {}={}", key, value);
                    self.script.options.push((key, value));
                }
            }
            v if IGNORED.contains(&v) => log::debug!("ignoring command: {}", line.trim()),
            _ => log::warn!("unsupported command: {}", line.trim()),
        }
        Ok(())
    }

    fn new_element(&mut self, params: Vec<Param>, dir: &Path) -> Result<()> {
        let (object, params) = object_name(params)?;
        let (class, name) = split_object(&object)?;
        if self.script.find(&class, &name).is_some() {
            bail!("duplicate element {}.{}", class, name);
        }
        self.script.definitions.push(Definition {
            class,
            name,
            props: Vec::new(),
        });
        self.script.dirs.push(dir.to_path_buf());
        let i = self.script.definitions.len() - 1;
        self.last = Some(i);
        self.assign(i, params)
    }

    fn edit_element(&mut self, params: Vec<Param>, dir: &Path) -> Result<()> {
        let (object, params) = object_name(params)?;
        let (class, name) = split_object(&object)?;
        let i = match self.script.find(&class, &name) {
            Some(i) => i,
            // The source of a circuit is edited as `vsource.source`.
            None if class == "circuit" && name == "source" => self
                .script
                .definitions
                .iter()
                .position(|d| d.class == "circuit")
                .ok_or_else(|| format_err!("no circuit defined"))?,
            None => bail!("element {}.{} not found", class, name),
        };
        self.script.dirs[i] = dir.to_path_buf();
        self.last = Some(i);
        self.assign(i, params)
    }

    fn assign(&mut self, i: usize, params: Vec<Param>) -> Result<()> {
        let def = &mut self.script.definitions[i];
        for (key, value) in params {
            match key {
                Some(key) => def.props.push((key, value)),
                None => log::warn!(
                    "ignoring positional value {:?} of {}",
                    value,
                    def.full_name()
                ),
            }
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) type Param = (Option<String>, String);

/// Takes the `class.name` object reference from the front of `params`.
fn object_name(mut params: Vec<Param>) -> Result<(String, Vec<Param>)> {
    if params.is_empty() {
        bail!("missing element name");
    }
    match params.remove(0) {
        (None, object) => Ok((object, params)),
        (Some(key), object) if key == "object" => Ok((object, params)),
        (Some(key), _) => bail!("expected element name, found property {}", key),
    }
}

fn split_object(object: &str) -> Result<(String, String)> {
    let (class, name) = object
        .split_once('.')
        .ok_or_else(|| format_err!("element name must be class.name: {}", object))?;
    if class.is_empty() || name.is_empty() {
        bail!("element name must be class.name: {}", object);
    }
    let class = match class.to_lowercase().as_str() {
        "vsource" => "circuit".to_string(),
        c => c.to_string(),
    };
    Ok((class, name.to_lowercase()))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Word(String),
    Eq,
}

pub(crate) fn tokenize(line: &str) -> Result<Vec<Tok>> {
    let mut toks = Vec::new();
    let mut word = String::new();
    let mut chars = line.chars().peekable();

    fn flush(word: &mut String, toks: &mut Vec<Tok>) {
        if !word.is_empty() {
            toks.push(Tok::Word(std::mem::take(word)));
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '!' => break,
            '/' if chars.peek() == Some(&'/') => break,
            c if c.is_whitespace() || c == ',' => flush(&mut word, &mut toks),
            '=' => {
                flush(&mut word, &mut toks);
                toks.push(Tok::Eq);
            }
            '(' | '[' | '{' | '"' | '\'' => {
                flush(&mut word, &mut toks);
                let close = match c {
                    '(' => ')',
                    '[' => ']',
                    '{' => '}',
                    q => q,
                };
                let mut group = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == close => break,
                        Some(c) => group.push(c),
                        None => bail!("unterminated {}", c),
                    }
                }
                toks.push(Tok::Word(group));
            }
            c => word.push(c),
        }
    }
    flush(&mut word, &mut toks);

    Ok(toks)
}

pub(crate) fn params(toks: &[Tok]) -> Result<Vec<Param>> {
    let mut params = Vec::new();
    let mut i = 0;
    while i < toks.len() {
        match (&toks[i], toks.get(i + 1), toks.get(i + 2)) {
            (Tok::Word(key), Some(Tok::Eq), Some(Tok::Word(value))) => {
                params.push((Some(key.to_lowercase()), value.clone()));
                i += 3;
            }
            (Tok::Word(key), Some(Tok::Eq), _) => bail!("missing value for {}", key),
            (Tok::Word(value), _, _) => {
                params.push((None, value.clone()));
                i += 1;
            }
            (Tok::Eq, _, _) => bail!("unexpected '='"),
        }
    }
    Ok(params)
}

fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => {
                // Keep line numbering intact.
                let comment = &rest[start..start + end + 2];
                out.extend(comment.chars().filter(|&c| c == '\n'));
                rest = &rest[start + end + 2..];
            }
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
