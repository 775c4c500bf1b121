//! Default construction variables for the TeX toolchain.

use crate::env::Environment;

/// Variables seeded by [`apply`], in definition order.
const DEFAULTS: &[(&str, &str)] = &[
    ("TEX", "tex"),
    ("TEXFLAGS", "-interaction=nonstopmode -recorder"),
    ("TEXCOM", "cd ${TARGET.dir} && $TEX $TEXFLAGS ${SOURCE.file}"),
    ("PDFTEX", "pdftex"),
    ("PDFTEXFLAGS", "-interaction=nonstopmode -recorder"),
    ("PDFTEXCOM", "cd ${TARGET.dir} && $PDFTEX $PDFTEXFLAGS ${SOURCE.file}"),
    ("LATEX", "latex"),
    ("LATEXFLAGS", "-interaction=nonstopmode -recorder"),
    ("LATEXCOM", "cd ${TARGET.dir} && $LATEX $LATEXFLAGS ${SOURCE.file}"),
    ("PDFLATEX", "pdflatex"),
    ("PDFLATEXFLAGS", "-interaction=nonstopmode -recorder"),
    (
        "PDFLATEXCOM",
        "cd ${TARGET.dir} && $PDFLATEX $PDFLATEXFLAGS ${SOURCE.file}",
    ),
    ("BIBTEX", "bibtex"),
    ("BIBTEXFLAGS", ""),
    ("BIBTEXCOM", "cd ${TARGET.dir} && $BIBTEX $BIBTEXFLAGS ${SOURCE.filebase}"),
    ("MAKEINDEX", "makeindex"),
    ("MAKEINDEXFLAGS", ""),
    (
        "MAKEINDEXCOM",
        "cd ${TARGET.dir} && $MAKEINDEX $MAKEINDEXFLAGS ${SOURCE.file}",
    ),
    ("MAKEGLOSSARY", "makeindex"),
    ("MAKEGLOSSARYSTYLE", "${SOURCE.filebase}.ist"),
    (
        "MAKEGLOSSARYFLAGS",
        "-s ${MAKEGLOSSARYSTYLE} -t ${SOURCE.filebase}.glg",
    ),
    (
        "MAKEGLOSSARYCOM",
        "cd ${TARGET.dir} && $MAKEGLOSSARY ${SOURCE.filebase}.glo $MAKEGLOSSARYFLAGS -o ${SOURCE.filebase}.gls",
    ),
    ("MAKEACRONYMS", "makeindex"),
    ("MAKEACRONYMSSTYLE", "${SOURCE.filebase}.ist"),
    (
        "MAKEACRONYMSFLAGS",
        "-s ${MAKEACRONYMSSTYLE} -t ${SOURCE.filebase}.alg",
    ),
    (
        "MAKEACRONYMSCOM",
        "cd ${TARGET.dir} && $MAKEACRONYMS ${SOURCE.filebase}.acn $MAKEACRONYMSFLAGS -o ${SOURCE.filebase}.acr",
    ),
    ("MAKENCL", "makeindex"),
    ("MAKENCLSTYLE", "nomencl.ist"),
    ("MAKENCLFLAGS", "-s ${MAKENCLSTYLE} -t ${SOURCE.filebase}.nlg"),
    (
        "MAKENCLCOM",
        "cd ${TARGET.dir} && $MAKENCL ${SOURCE.filebase}.nlo $MAKENCLFLAGS -o ${SOURCE.filebase}.nls",
    ),
    ("LATEXRETRIES", "3"),
    ("LATEXSUFFIXES", ".tex .ltx .latex"),
    ("PDFSUFFIX", ".pdf"),
    ("DVISUFFIX", ".dvi"),
];

/// Retry limit used when `LATEXRETRIES` is missing or not a number.
pub const DEFAULT_RETRIES: u32 = 3;

/// Seed `env` with the TeX tool variables it does not define yet.
pub fn apply(env: &mut Environment) {
    for (key, value) in DEFAULTS {
        env.set_default(*key, *value);
    }
}
