//! Canonical column names: trimmed, lower-case, `_` for spaces, Portuguese accents folded.

use super::RowBatch;

const ACCENT_FOLDS: [(char, char); 12] = [
    ('ã', 'a'),
    ('á', 'a'),
    ('â', 'a'),
    ('à', 'a'),
    ('é', 'e'),
    ('ê', 'e'),
    ('í', 'i'),
    ('ó', 'o'),
    ('ô', 'o'),
    ('õ', 'o'),
    ('ú', 'u'),
    ('ç', 'c'),
];

/// Idempotent: `normalize_column_name(normalize_column_name(s)) == normalize_column_name(s)`.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            other => fold_accent(other),
        })
        .collect()
}

pub fn normalize_columns<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    headers
        .iter()
        .map(|h| normalize_column_name(h.as_ref()))
        .collect()
}

/// Rewrites the batch headers in place; row data is untouched.
pub fn normalize_batch(batch: &mut RowBatch) {
    batch.headers = normalize_columns(&batch.headers);
}

fn fold_accent(c: char) -> char {
    ACCENT_FOLDS
        .iter()
        .find(|(accented, _)| *accented == c)
        .map(|(_, base)| *base)
        .unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_names() {
        assert_eq!(normalize_column_name("  Descrição Conta "), "descricao_conta");
        assert_eq!(normalize_column_name("REG_ANS"), "reg_ans");
        assert_eq!(normalize_column_name("Razão Social"), "razao_social");
        assert_eq!(normalize_column_name("Região de Comercialização"), "regiao_de_comercializacao");
        assert_eq!(normalize_column_name("\u{feff}DATA"), "data");
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let raw = [
            "VL_SALDO_FINAL",
            " Modalidade ",
            "Ação Ôrça",
            "já normalizado",
            "cd_conta_contabil",
        ];
        let once = normalize_columns(&raw);
        let twice = normalize_columns(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn batch_headers_are_rewritten() {
        let mut batch = RowBatch::new(vec!["CD CONTA CONTABIL".into(), "Descrição".into()]);
        batch.rows.push(vec!["31100".into(), "Eventos".into()]);
        normalize_batch(&mut batch);
        assert_eq!(batch.headers, vec!["cd_conta_contabil", "descricao"]);
        assert_eq!(batch.rows[0][1], "Eventos");
    }
}
