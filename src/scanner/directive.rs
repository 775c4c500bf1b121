//! Extraction of `\include`-style directives from LaTeX text.

use std::fmt;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;

/// Matches one directive with optional `[...]` options and captures the
/// keyword and the braced argument. Longer keywords precede their prefixes.
static DIRECTIVE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"\\(includegraphics|include|lstinputlisting|input|bibliographystyle|bibliography|usepackage)\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}",
    )
    .ok()
});

/// Directive keywords the scanner understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyword {
    /// `\include{chapter}`
    Include,
    /// `\input{file}`
    Input,
    /// `\includegraphics[opts]{figure}`
    IncludeGraphics,
    /// `\lstinputlisting[opts]{code}`
    LstInputListing,
    /// `\bibliography{refs,more}`
    Bibliography,
    /// `\bibliographystyle{style}`
    BibliographyStyle,
    /// `\usepackage{pkg}`
    UsePackage,
}

impl Keyword {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "include" => Self::Include,
            "input" => Self::Input,
            "includegraphics" => Self::IncludeGraphics,
            "lstinputlisting" => Self::LstInputListing,
            "bibliography" => Self::Bibliography,
            "bibliographystyle" => Self::BibliographyStyle,
            "usepackage" => Self::UsePackage,
            _ => return None,
        })
    }

    /// Spelling in LaTeX source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Input => "input",
            Self::IncludeGraphics => "includegraphics",
            Self::LstInputListing => "lstinputlisting",
            Self::Bibliography => "bibliography",
            Self::BibliographyStyle => "bibliographystyle",
            Self::UsePackage => "usepackage",
        }
    }

    /// Construction variable listing this keyword's search directories.
    #[must_use]
    pub const fn path_var(self) -> &'static str {
        match self {
            Self::Bibliography => "BIBINPUTS",
            Self::BibliographyStyle => "BSTINPUTS",
            _ => "TEXINPUTS",
        }
    }

    /// Whether files found through this keyword may reference more files.
    #[must_use]
    pub const fn recurses(self) -> bool {
        matches!(self, Self::Include | Self::Input | Self::UsePackage)
    }

    /// File names to try for `reference`, in preference order.
    ///
    /// See [`candidate_names`]; `graphics` are the extensions inferred for
    /// `\includegraphics`.
    #[must_use]
    pub fn candidates(self, reference: &str, graphics: &[&str]) -> Vec<String> {
        let inferred: &[&str] = match self {
            Self::Include | Self::Input => &[".tex"],
            Self::Bibliography => &[".bib"],
            Self::BibliographyStyle => &[".bst"],
            Self::UsePackage => &[".sty"],
            Self::IncludeGraphics => graphics,
            Self::LstInputListing => &[],
        };
        candidate_names(reference, inferred)
    }
}

/// File names to try for `reference` given the `inferred` extensions.
///
/// A name without an extension tries each inferred extension before the
/// bare name; a name with an explicit extension is only tried as given.
#[must_use]
pub fn candidate_names(reference: &str, inferred: &[&str]) -> Vec<String> {
    if Utf8Path::new(reference).extension().is_some() {
        return vec![reference.to_owned()];
    }
    inferred
        .iter()
        .map(|ext| format!("{reference}{ext}"))
        .chain(std::iter::once(reference.to_owned()))
        .collect()
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(keyword, raw reference)` occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Directive {
    /// Directive keyword.
    pub keyword: Keyword,
    /// Reference exactly as written, trimmed.
    pub reference: String,
}

impl Directive {
    /// Case-folded, separator-normalised form used to order results.
    #[must_use]
    pub fn sort_key(&self) -> String {
        self.reference.trim().replace('\\', "/").to_lowercase()
    }
}

/// Extract every directive from `text`, splitting comma-separated lists.
///
/// Anything after an unescaped `%` on a line is a comment and ignored.
#[must_use]
pub fn extract(text: &str) -> Vec<Directive> {
    let Some(re) = DIRECTIVE.as_ref() else {
        debug_assert!(false, "directive pattern failed to compile");
        return Vec::new();
    };
    let mut out = Vec::new();
    for line in text.lines() {
        let code = strip_comment(line);
        for caps in re.captures_iter(code) {
            let (Some(keyword), Some(args)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(keyword) = Keyword::parse(keyword.as_str()) else {
                continue;
            };
            out.extend(
                args.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| Directive {
                        keyword,
                        reference: name.to_owned(),
                    }),
            );
        }
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\\' => escaped = !escaped,
            '%' if !escaped => return line.get(..idx).unwrap_or(line),
            _ => escaped = false,
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn pairs(text: &str) -> Vec<(Keyword, String)> {
        extract(text)
            .into_iter()
            .map(|d| (d.keyword, d.reference))
            .collect()
    }

    #[rstest]
    fn splits_lists_and_strips_options() {
        let text = "\\bibliography{phys, comp}\n\\includegraphics[clip,width=0.7\\linewidth]{picture.eps}";
        assert_eq!(
            pairs(text),
            [
                (Keyword::Bibliography, "phys".to_owned()),
                (Keyword::Bibliography, "comp".to_owned()),
                (Keyword::IncludeGraphics, "picture.eps".to_owned()),
            ]
        );
    }

    #[rstest]
    fn finds_several_directives_on_one_line() {
        assert_eq!(
            pairs("\\input{a}\\input{b} \\include{c}"),
            [
                (Keyword::Input, "a".to_owned()),
                (Keyword::Input, "b".to_owned()),
                (Keyword::Include, "c".to_owned()),
            ]
        );
    }

    #[rstest]
    #[case("% \\input{hidden}", &[])]
    #[case("text % \\input{hidden}", &[])]
    #[case("50\\% done \\input{shown}", &["shown"])]
    #[case("\\\\% \\input{hidden}", &[])]
    fn ignores_comments(#[case] text: &str, #[case] expected: &[&str]) {
        let names: Vec<String> = extract(text).into_iter().map(|d| d.reference).collect();
        assert_eq!(names, expected);
    }

    #[rstest]
    fn distinguishes_prefix_keywords() {
        assert_eq!(
            pairs("\\bibliographystyle{plain}\\inputencoding{utf8}"),
            [(Keyword::BibliographyStyle, "plain".to_owned())]
        );
    }

    #[rstest]
    #[case(Keyword::Include, "chap", &["chap.tex", "chap"])]
    #[case(Keyword::Input, "chap.tex", &["chap.tex"])]
    #[case(Keyword::Bibliography, "refs", &["refs.bib", "refs"])]
    #[case(Keyword::Bibliography, "refs.bib", &["refs.bib"])]
    #[case(Keyword::BibliographyStyle, "plain", &["plain.bst", "plain"])]
    #[case(Keyword::UsePackage, "mystyle", &["mystyle.sty", "mystyle"])]
    #[case(Keyword::IncludeGraphics, "fig", &["fig.eps", "fig.ps", "fig"])]
    #[case(Keyword::LstInputListing, "code", &["code"])]
    fn candidate_names(#[case] keyword: Keyword, #[case] raw: &str, #[case] expected: &[&str]) {
        assert_eq!(keyword.candidates(raw, &[".eps", ".ps"]), expected);
    }

    #[rstest]
    fn sort_key_folds_case_and_separators() {
        let d = Directive {
            keyword: Keyword::Input,
            reference: " Sub\\Intro ".to_owned(),
        };
        assert_eq!(d.sort_key(), "sub/intro");
    }
}
