use crate::NamesError;

/// Parsed, un-joined series name: one metric plus its sorted tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub metric: String,
    pub tags: Vec<(String, String)>,
}

impl ParsedName {
    /// Renders `metric tag1=v1 tag2=v2`, tags already sorted lexicographically.
    pub fn canonical(&self) -> String {
        let mut out = self.metric.clone();
        for (k, v) in &self.tags {
            out.push(' ');
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }
}

/// Parses `metric tag=value tag=value ...` into metric + sorted tags.
/// Does not handle the joined `a:b:c tag=v` form — see [`parse_joined`].
pub fn parse_single(raw: &str) -> Result<ParsedName, NamesError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NamesError::BadInput("empty name".into()));
    }

    let mut parts = raw.split_whitespace();
    let metric = parts
        .next()
        .ok_or_else(|| NamesError::BadInput("missing metric".into()))?
        .to_string();
    if metric.contains('=') {
        return Err(NamesError::BadInput(format!(
            "metric token '{metric}' looks like a tag"
        )));
    }

    let mut tags = Vec::new();
    for tok in parts {
        let (k, v) = tok
            .split_once('=')
            .ok_or_else(|| NamesError::BadInput(format!("malformed tag '{tok}'")))?;
        if k.is_empty() || v.is_empty() {
            return Err(NamesError::BadInput(format!("malformed tag '{tok}'")));
        }
        tags.push((k.to_string(), v.to_string()));
    }
    tags.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    Ok(ParsedName { metric, tags })
}

/// Expands `a:b:c tag=v` into `[a tag=v, b tag=v, c tag=v]`, preserving
/// input order of the joined metrics. Each sub-metric must not itself be a
/// tagged name (no bare `=`).
pub fn parse_joined(raw: &str) -> Result<Vec<ParsedName>, NamesError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NamesError::BadInput("empty name".into()));
    }

    let mut parts = raw.splitn(2, char::is_whitespace);
    let metrics_token = parts
        .next()
        .ok_or_else(|| NamesError::BadInput("missing metric".into()))?;
    let tag_tail = parts.next().unwrap_or("");

    let mut tags = Vec::new();
    for tok in tag_tail.split_whitespace() {
        let (k, v) = tok
            .split_once('=')
            .ok_or_else(|| NamesError::BadInput(format!("malformed tag '{tok}'")))?;
        if k.is_empty() || v.is_empty() {
            return Err(NamesError::BadInput(format!("malformed tag '{tok}'")));
        }
        tags.push((k.to_string(), v.to_string()));
    }
    tags.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for metric in metrics_token.split(':') {
        if metric.is_empty() || metric.contains('=') {
            return Err(NamesError::BadInput(format!(
                "joined sub-name '{metric}' parses as tagged"
            )));
        }
        out.push(ParsedName {
            metric: metric.to_string(),
            tags: tags.clone(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sorts_tags_lexicographically() {
        let p = parse_single("cpu host=a zone=b region=c").unwrap();
        assert_eq!(p.canonical(), "cpu host=a region=c zone=b");
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_single("").is_err());
        assert!(parse_single("   ").is_err());
    }

    #[test]
    fn rejects_malformed_tag() {
        assert!(parse_single("cpu host").is_err());
    }

    #[test]
    fn joined_cross_product_preserves_order() {
        let out = parse_joined("cpu:mem host=a").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].canonical(), "cpu host=a");
        assert_eq!(out[1].canonical(), "mem host=a");
    }

    #[test]
    fn joined_rejects_tagged_sub_name() {
        assert!(parse_joined("cpu:host=a foo=bar").is_err());
    }

    proptest::proptest! {
        #[test]
        fn canonical_is_stable_under_tag_reordering(
            metric in "[a-z][a-z0-9]{0,8}",
            mut tags in proptest::collection::vec(("[a-z][a-z0-9]{0,5}", "[a-z0-9]{1,5}"), 1..6),
        ) {
            tags.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            tags.dedup_by(|a, b| a.0 == b.0);
            let forward = format!(
                "{metric} {}",
                tags.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
            );
            let mut shuffled = tags.clone();
            shuffled.reverse();
            let backward = format!(
                "{metric} {}",
                shuffled.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
            );
            let a = parse_single(&forward).unwrap();
            let b = parse_single(&backward).unwrap();
            prop_assert_eq!(a.canonical(), b.canonical());
        }
    }
}
