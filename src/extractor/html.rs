//! HTML 텍스트 추출
//!
//! `<script>`, `<style>`, `<noscript>` 내용을 제외한 텍스트 노드만 모읍니다.

use scraper::{Html, Node};

/// 텍스트를 수집하지 않는 태그
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// HTML 문서에서 본문 텍스트 추출
///
/// 줄 단위로 공백을 정리하고, 두 칸 이상 공백으로 나뉜 조각을 한 칸 공백으로 잇습니다.
pub fn extract_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIPPED_TAGS.contains(&e.name()))
                .unwrap_or(false)
        });
        if skipped {
            continue;
        }

        raw.push_str(text);
    }

    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
