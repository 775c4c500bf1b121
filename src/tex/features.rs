//! Document features that decide which auxiliary files a build produces.

use std::sync::LazyLock;

use regex::Regex;

/// One feature pattern; a match on an uncommented line enables the flag.
macro_rules! feature_pattern {
    ($name:ident, $pattern:literal) => {
        static $name: LazyLock<Option<Regex>> =
            LazyLock::new(|| Regex::new(concat!(r"(?m)^[^%\n]*", $pattern)).ok());
    };
}

feature_pattern!(TABLE_OF_CONTENTS, r"\\tableofcontents");
feature_pattern!(MAKE_INDEX, r"\\makeindex");
feature_pattern!(BIBLIOGRAPHY, r"\\bibliography");
feature_pattern!(LIST_OF_FIGURES, r"\\listoffigures");
feature_pattern!(LIST_OF_TABLES, r"\\listoftables");
feature_pattern!(HYPERREF, r"\\usepackage.*\{hyperref\}");
feature_pattern!(MAKE_NOMENCLATURE, r"\\makenomenclature");
feature_pattern!(MAKE_GLOSSARY, r"\\makeglossary\b");
feature_pattern!(MAKE_GLOSSARIES, r"\\makeglossaries");
feature_pattern!(BEAMER, r"\\documentclass\{beamer\}");

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Which optional LaTeX machinery a document uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "independent document flags read straight from the source"
)]
pub struct Features {
    /// `\tableofcontents`
    pub table_of_contents: bool,
    /// `\makeindex`
    pub index: bool,
    /// `\bibliography`
    pub bibliography: bool,
    /// `\listoffigures`
    pub list_of_figures: bool,
    /// `\listoftables`
    pub list_of_tables: bool,
    /// `\usepackage{hyperref}`
    pub hyperref: bool,
    /// `\makenomenclature`
    pub nomenclature: bool,
    /// `\makeglossary`
    pub glossary: bool,
    /// `\makeglossaries`, which also enables acronyms.
    pub glossaries: bool,
    /// `\documentclass{beamer}`
    pub beamer: bool,
}

impl Features {
    /// Detect features in `text`, ignoring commented lines.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        Self {
            table_of_contents: matches(&TABLE_OF_CONTENTS, text),
            index: matches(&MAKE_INDEX, text),
            bibliography: matches(&BIBLIOGRAPHY, text),
            list_of_figures: matches(&LIST_OF_FIGURES, text),
            list_of_tables: matches(&LIST_OF_TABLES, text),
            hyperref: matches(&HYPERREF, text),
            nomenclature: matches(&MAKE_NOMENCLATURE, text),
            glossary: matches(&MAKE_GLOSSARY, text),
            glossaries: matches(&MAKE_GLOSSARIES, text),
            beamer: matches(&BEAMER, text),
        }
    }

    /// Union of two feature sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            table_of_contents: self.table_of_contents || other.table_of_contents,
            index: self.index || other.index,
            bibliography: self.bibliography || other.bibliography,
            list_of_figures: self.list_of_figures || other.list_of_figures,
            list_of_tables: self.list_of_tables || other.list_of_tables,
            hyperref: self.hyperref || other.hyperref,
            nomenclature: self.nomenclature || other.nomenclature,
            glossary: self.glossary || other.glossary,
            glossaries: self.glossaries || other.glossaries,
            beamer: self.beamer || other.beamer,
        }
    }

    /// Whether acronym lists are generated.
    #[must_use]
    pub const fn acronyms(self) -> bool {
        self.glossaries
    }

    /// Auxiliary suffixes the enabled features make LaTeX write.
    #[must_use]
    pub fn suffixes(self) -> Vec<&'static str> {
        let groups: [(bool, &[&'static str]); 10] = [
            (self.index, &[".idx", ".ind", ".ilg"]),
            (self.bibliography, &[".bbl", ".blg"]),
            (self.table_of_contents, &[".toc"]),
            (self.list_of_figures, &[".lof"]),
            (self.list_of_tables, &[".lot"]),
            (self.hyperref, &[".out"]),
            (self.nomenclature, &[".nlo", ".nls", ".nlg"]),
            (self.glossary || self.glossaries, &[".glo", ".gls", ".glg"]),
            (self.acronyms(), &[".acn", ".acr", ".alg"]),
            (self.beamer, &[".nav", ".snm", ".out", ".toc"]),
        ];
        let mut out: Vec<&'static str> = Vec::new();
        for suffix in groups
            .into_iter()
            .filter(|(on, _)| *on)
            .flat_map(|(_, suffixes)| suffixes.iter().copied())
        {
            if !out.contains(&suffix) {
                out.push(suffix);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn commented_commands_are_ignored() {
        let features = Features::detect("% \\makeindex\n\\tableofcontents\n");
        assert!(!features.index);
        assert!(features.table_of_contents);
    }

    #[rstest]
    #[case("\\makeglossaries", &[".glo", ".gls", ".glg", ".acn", ".acr", ".alg"])]
    #[case("\\makeglossary", &[".glo", ".gls", ".glg"])]
    #[case("\\documentclass{beamer}\n\\usepackage[colorlinks]{hyperref}", &[".out", ".nav", ".snm", ".toc"])]
    #[case("\\bibliography{refs}\n\\makeindex", &[".idx", ".ind", ".ilg", ".bbl", ".blg"])]
    fn suffixes_follow_features(#[case] text: &str, #[case] expected: &[&str]) {
        assert_eq!(Features::detect(text).suffixes(), expected);
    }
}
