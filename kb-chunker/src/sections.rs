/// A contiguous slice of a document introduced by zero or more ATX headings.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading_path: Vec<String>,
    pub text: String,
}

/// Split `content` along Markdown ATX headings of level 1–4.
///
/// A section consists of the heading line that introduces it plus all
/// content up to (but not including) the next heading of level 1–4. Each
/// section's `heading_path` is the ordered list of enclosing headings at
/// levels 1..4 whose values are non-empty — levels never set yet (or
/// cleared by a shallower heading) are simply absent, not empty strings.
pub fn split_into_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: [Option<String>; 4] = [None, None, None, None];

    let mut current_heading_path: Vec<String> = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut started = false;

    let flush = |lines: &[&str], heading_path: &[String], sections: &mut Vec<Section>| {
        let text = lines.join("\n");
        if !text.trim().is_empty() {
            sections.push(Section {
                heading_path: heading_path.to_vec(),
                text,
            });
        }
    };

    for line in content.lines() {
        if let Some((level, title)) = parse_atx_heading(line) {
            // Close the section in progress before starting a new one.
            if started {
                flush(&current_lines, &current_heading_path, &mut sections);
            }
            stack[level - 1] = Some(title.to_string());
            for slot in stack.iter_mut().skip(level) {
                *slot = None;
            }
            current_heading_path = stack.iter().filter_map(|s| s.clone()).collect();
            current_lines = vec![line];
            started = true;
        } else {
            if !started {
                // Preamble before any heading is its own section with an
                // empty heading path.
                started = true;
            }
            current_lines.push(line);
        }
    }
    if started {
        flush(&current_lines, &current_heading_path, &mut sections);
    }

    if sections.is_empty() && !content.trim().is_empty() {
        sections.push(Section {
            heading_path: Vec::new(),
            text: content.to_string(),
        });
    }

    sections
}

/// Parse a line as an ATX heading of level 1–4, returning `(level, title)`.
/// Levels beyond 4 (`#####` and deeper) are not treated as structural
/// boundaries and fall through as ordinary content.
fn parse_atx_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 4 {
        return None;
    }
    let rest = &trimmed[hashes..];
    // ATX headings require a space (or end of line) after the hashes.
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((hashes, rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headings_of_all_levels() {
        let md = "# A\nbody a\n## B\nbody b\n### C\nbody c\n";
        let sections = split_into_sections(md);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].heading_path, vec!["A"]);
        assert_eq!(sections[1].heading_path, vec!["A", "B"]);
        assert_eq!(sections[2].heading_path, vec!["A", "B", "C"]);
    }

    #[test]
    fn sibling_heading_resets_deeper_levels() {
        let md = "# A\n## B\ntext\n## C\ntext2\n";
        let sections = split_into_sections(md);
        assert_eq!(sections[2].heading_path, vec!["A", "C"]);
    }

    #[test]
    fn preamble_before_any_heading_has_empty_path() {
        let md = "intro text\n# A\nbody\n";
        let sections = split_into_sections(md);
        assert_eq!(sections[0].heading_path, Vec::<String>::new());
        assert!(sections[0].text.contains("intro text"));
    }

    #[test]
    fn empty_content_yields_no_sections() {
        assert!(split_into_sections("").is_empty());
        assert!(split_into_sections("   \n\n").is_empty());
    }

    #[test]
    fn level_five_heading_is_not_a_boundary() {
        let md = "# A\nbody\n##### not a boundary\nmore\n";
        let sections = split_into_sections(md);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("##### not a boundary"));
    }
}
