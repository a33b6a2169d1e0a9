//! Subdocument path navigation over `serde_json` values.

use serde_json::{Map, Value};

use super::SubdocCommandKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathError {
    NotFound,
    Exists,
    Mismatch,
    Invalid,
}

/// Splits `a.b[0].c` into segments. The empty path addresses the root.
pub(crate) fn parse(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Some(segments);
    }
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            segments.push(Segment::Key(name.to_string()));
        } else if rest.is_empty() {
            return None;
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest[1..close].parse::<i64>().ok()?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    Some(segments)
}

/// Negative indices count from the end.
fn resolve(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    } else {
        let index = usize::try_from(index).ok()?;
        (index < len).then_some(index)
    }
}

pub(crate) fn get<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(index), Value::Array(items)) => {
                resolve(*index, items.len()).and_then(|i| items.get(i))
            }
            _ => None,
        })
}

/// Container of the last segment, creating intermediate objects when asked.
fn parent_mut<'a>(root: &'a mut Value, segments: &[Segment], create: bool) -> Option<&'a mut Value> {
    let (_, parents) = segments.split_last()?;
    let mut current = root;
    for segment in parents {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => {
                if create {
                    map.entry(key.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(key)?
                }
            }
            (Segment::Index(index), Value::Array(items)) => {
                let len = items.len();
                items.get_mut(resolve(*index, len)?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn parse_single(fragment: &[u8]) -> Result<Value, PathError> {
    serde_json::from_slice(fragment).map_err(|_| PathError::Invalid)
}

fn parse_multi(fragment: &[u8]) -> Result<Vec<Value>, PathError> {
    let mut wrapped = Vec::with_capacity(fragment.len() + 2);
    wrapped.push(b'[');
    wrapped.extend_from_slice(fragment);
    wrapped.push(b']');
    serde_json::from_slice(&wrapped).map_err(|_| PathError::Invalid)
}

fn array_target<'a>(
    root: &'a mut Value,
    segments: &[Segment],
    create_path: bool,
) -> Result<&'a mut Vec<Value>, PathError> {
    let target = match segments.last() {
        None => root,
        Some(last) => {
            let parent = parent_mut(root, segments, create_path).ok_or(PathError::NotFound)?;
            match (last, parent) {
                (Segment::Key(key), Value::Object(map)) => {
                    if create_path {
                        map.entry(key.clone())
                            .or_insert_with(|| Value::Array(Vec::new()))
                    } else {
                        map.get_mut(key).ok_or(PathError::NotFound)?
                    }
                }
                (Segment::Index(index), Value::Array(items)) => {
                    let i = resolve(*index, items.len()).ok_or(PathError::NotFound)?;
                    &mut items[i]
                }
                _ => return Err(PathError::Mismatch),
            }
        }
    };
    match target {
        Value::Array(items) => Ok(items),
        _ => Err(PathError::Mismatch),
    }
}

/// Applies one path-level mutation. Counters return their new value.
pub(crate) fn apply(
    root: &mut Value,
    kind: SubdocCommandKind,
    segments: &[Segment],
    create_path: bool,
    fragment: &[u8],
) -> Result<Option<Value>, PathError> {
    match kind {
        SubdocCommandKind::DictAdd | SubdocCommandKind::DictUpsert | SubdocCommandKind::Replace => {
            let value = parse_single(fragment)?;
            let last = segments.last().ok_or(PathError::Invalid)?;
            let parent = parent_mut(root, segments, create_path).ok_or(PathError::NotFound)?;
            match (last, parent) {
                (Segment::Key(key), Value::Object(map)) => {
                    let exists = map.contains_key(key);
                    if kind == SubdocCommandKind::DictAdd && exists {
                        return Err(PathError::Exists);
                    }
                    if kind == SubdocCommandKind::Replace && !exists {
                        return Err(PathError::NotFound);
                    }
                    map.insert(key.clone(), value);
                }
                (Segment::Index(index), Value::Array(items)) if kind == SubdocCommandKind::Replace => {
                    let i = resolve(*index, items.len()).ok_or(PathError::NotFound)?;
                    items[i] = value;
                }
                _ => return Err(PathError::Mismatch),
            }
            Ok(None)
        }
        SubdocCommandKind::Delete => {
            let last = segments.last().ok_or(PathError::Invalid)?;
            let parent = parent_mut(root, segments, false).ok_or(PathError::NotFound)?;
            match (last, parent) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.remove(key).ok_or(PathError::NotFound)?;
                }
                (Segment::Index(index), Value::Array(items)) => {
                    let i = resolve(*index, items.len()).ok_or(PathError::NotFound)?;
                    items.remove(i);
                }
                _ => return Err(PathError::Mismatch),
            }
            Ok(None)
        }
        SubdocCommandKind::ArrayPushLast => {
            let values = parse_multi(fragment)?;
            array_target(root, segments, create_path)?.extend(values);
            Ok(None)
        }
        SubdocCommandKind::ArrayPushFirst => {
            let values = parse_multi(fragment)?;
            array_target(root, segments, create_path)?.splice(0..0, values);
            Ok(None)
        }
        SubdocCommandKind::ArrayAddUnique => {
            let value = parse_single(fragment)?;
            let items = array_target(root, segments, create_path)?;
            if items.contains(&value) {
                return Err(PathError::Exists);
            }
            items.push(value);
            Ok(None)
        }
        SubdocCommandKind::ArrayInsert => {
            let values = parse_multi(fragment)?;
            let Some(Segment::Index(index)) = segments.last() else {
                return Err(PathError::Invalid);
            };
            let position = usize::try_from(*index).map_err(|_| PathError::Invalid)?;
            let parent = parent_mut(root, segments, false).ok_or(PathError::NotFound)?;
            let Value::Array(items) = parent else {
                return Err(PathError::Mismatch);
            };
            if position > items.len() {
                return Err(PathError::NotFound);
            }
            items.splice(position..position, values);
            Ok(None)
        }
        SubdocCommandKind::Counter => {
            let delta = std::str::from_utf8(fragment)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or(PathError::Invalid)?;
            let last = segments.last().ok_or(PathError::Invalid)?;
            let parent = parent_mut(root, segments, create_path).ok_or(PathError::NotFound)?;
            let slot = match (last, parent) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.entry(key.clone()).or_insert(Value::from(0))
                }
                (Segment::Index(index), Value::Array(items)) => {
                    let i = resolve(*index, items.len()).ok_or(PathError::NotFound)?;
                    &mut items[i]
                }
                _ => return Err(PathError::Mismatch),
            };
            let current = slot.as_i64().ok_or(PathError::Mismatch)?;
            let next = current.checked_add(delta).ok_or(PathError::Invalid)?;
            *slot = Value::from(next);
            Ok(Some(Value::from(next)))
        }
        _ => Err(PathError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn segs(path: &str) -> Vec<Segment> {
        parse(path).unwrap()
    }

    #[test]
    fn parses_keys_and_indices() {
        assert_eq!(
            segs("a.b[2][-1].c"),
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Index(-1),
                Segment::Key("c".into()),
            ]
        );
        assert!(parse("a..b").is_none());
        assert!(parse("a[x]").is_none());
    }

    #[test]
    fn upsert_needs_create_path_for_missing_parents() {
        let mut doc = json!({});
        assert_eq!(
            apply(&mut doc, SubdocCommandKind::DictUpsert, &segs("a.b"), false, b"1"),
            Err(PathError::NotFound)
        );
        apply(&mut doc, SubdocCommandKind::DictUpsert, &segs("a.b"), true, b"1").unwrap();
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn array_operations() {
        let mut doc = json!({"list": [2]});
        apply(&mut doc, SubdocCommandKind::ArrayPushLast, &segs("list"), false, b"3,4").unwrap();
        apply(&mut doc, SubdocCommandKind::ArrayPushFirst, &segs("list"), false, b"1").unwrap();
        apply(&mut doc, SubdocCommandKind::ArrayInsert, &segs("list[2]"), false, b"9").unwrap();
        assert_eq!(doc, json!({"list": [1, 2, 9, 3, 4]}));
        assert_eq!(
            apply(&mut doc, SubdocCommandKind::ArrayAddUnique, &segs("list"), false, b"9"),
            Err(PathError::Exists)
        );
    }

    #[test]
    fn counter_returns_new_value() {
        let mut doc = json!({"n": 10});
        let next = apply(&mut doc, SubdocCommandKind::Counter, &segs("n"), false, b"-3").unwrap();
        assert_eq!(next, Some(json!(7)));
        assert_eq!(get(&doc, &segs("n")), Some(&json!(7)));
    }
}
