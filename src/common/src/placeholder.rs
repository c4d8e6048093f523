use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\{\{\$\.(inputs|outputs)\.(artifacts|parameters)\['(.*)'\](?:\.(uri|path|output_file))?\}\}$",
    )
    .expect("valid placeholder pattern")
});

/// A placeholder the step's command line may contain, keyed by kind and declared name.
///
/// The textual form is fixed by the pipeline compiler, see [`fmt::Display`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    InputArtifactUri(String),
    InputArtifactPath(String),
    InputParameter(String),
    OutputArtifactPath(String),
    OutputArtifactUri(String),
    OutputParameterFile(String),
}

impl Placeholder {
    /// Parses an exact token. Anything that is not a whole, well-formed token yields `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let captures = TOKEN_PATTERN.captures(token)?;
        let name = captures[3].to_string();
        let suffix = captures.get(4).map(|m| m.as_str());

        match (&captures[1], &captures[2], suffix) {
            ("inputs", "artifacts", Some("uri")) => Some(Placeholder::InputArtifactUri(name)),
            ("inputs", "artifacts", Some("path")) => Some(Placeholder::InputArtifactPath(name)),
            ("inputs", "parameters", None) => Some(Placeholder::InputParameter(name)),
            ("outputs", "artifacts", Some("path")) => Some(Placeholder::OutputArtifactPath(name)),
            ("outputs", "artifacts", Some("uri")) => Some(Placeholder::OutputArtifactUri(name)),
            ("outputs", "parameters", Some("output_file")) => {
                Some(Placeholder::OutputParameterFile(name))
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Placeholder::InputArtifactUri(name)
            | Placeholder::InputArtifactPath(name)
            | Placeholder::InputParameter(name)
            | Placeholder::OutputArtifactPath(name)
            | Placeholder::OutputArtifactUri(name)
            | Placeholder::OutputParameterFile(name) => name,
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::InputArtifactUri(name) => {
                write!(f, "{{{{$.inputs.artifacts['{}'].uri}}}}", name)
            }
            Placeholder::InputArtifactPath(name) => {
                write!(f, "{{{{$.inputs.artifacts['{}'].path}}}}", name)
            }
            Placeholder::InputParameter(name) => {
                write!(f, "{{{{$.inputs.parameters['{}']}}}}", name)
            }
            Placeholder::OutputArtifactPath(name) => {
                write!(f, "{{{{$.outputs.artifacts['{}'].path}}}}", name)
            }
            Placeholder::OutputArtifactUri(name) => {
                write!(f, "{{{{$.outputs.artifacts['{}'].uri}}}}", name)
            }
            Placeholder::OutputParameterFile(name) => {
                write!(f, "{{{{$.outputs.parameters['{}'].output_file}}}}", name)
            }
        }
    }
}

/// Resolved value for every placeholder registered during one launch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    replacements: BTreeMap<Placeholder, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.replacements.insert(placeholder, value.into());
    }

    pub fn get(&self, placeholder: &Placeholder) -> Option<&str> {
        self.replacements.get(placeholder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Placeholder, &str)> {
        self.replacements
            .iter()
            .map(|(placeholder, value)| (placeholder, value.as_str()))
    }

    /// Value for an argument that is exactly a registered token.
    pub fn resolve(&self, arg: &str) -> Option<&str> {
        Placeholder::parse(arg).and_then(|placeholder| self.get(&placeholder))
    }

    /// Replaces every argument that is exactly a registered token; everything else passes through.
    pub fn rewrite<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        args.iter()
            .map(|arg| {
                let arg = arg.as_ref();
                self.resolve(arg).unwrap_or(arg).to_string()
            })
            .collect()
    }
}
