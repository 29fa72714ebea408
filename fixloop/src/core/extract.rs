//! Strategies for pulling replacement source out of a free-form reply.

use regex::Regex;

/// Extracts exactly one replacement-source block from an unstructured reply.
///
/// Implementations return an empty string when the reply carries no usable
/// block. They never validate the extracted code.
pub trait ResponseParser {
    fn extract(&self, reply: &str) -> String;
}

/// Takes the first fenced block tagged with a given language.
///
/// The tag must be the whole info string (trailing blanks allowed), so a
/// `ts` parser ignores ```` ```tsx ```` and ```` ```ts.old ```` blocks. The
/// block content is returned trimmed.
#[derive(Debug, Clone)]
pub struct FencedBlockParser {
    pattern: Regex,
}

impl FencedBlockParser {
    pub fn new(tag: &str) -> Self {
        let pattern = Regex::new(&format!(r"(?s)```{}[ \t]*\r?\n(.*?)```", regex::escape(tag)))
            .expect("escaped fence pattern should be valid");
        Self { pattern }
    }
}

impl ResponseParser for FencedBlockParser {
    fn extract(&self, reply: &str) -> String {
        self.pattern
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .map(|body| body.as_str().trim().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_tagged_block_trimmed() {
        let parser = FencedBlockParser::new("typescript");
        let reply = "Here is the fix:\n\n```typescript\n\n  export const a = 1;\n\n```\nDone.";
        assert_eq!(parser.extract(reply), "export const a = 1;");
    }

    #[test]
    fn returns_empty_without_tagged_block() {
        let parser = FencedBlockParser::new("typescript");
        assert_eq!(parser.extract("I could not fix this."), "");
        assert_eq!(parser.extract("```\nexport const a = 1;\n```"), "");
        assert_eq!(parser.extract("```json\n{}\n```"), "");
    }

    #[test]
    fn takes_first_of_several_blocks() {
        let parser = FencedBlockParser::new("typescript");
        let reply = "```typescript\nfirst();\n```\ntext\n```typescript\nsecond();\n```";
        assert_eq!(parser.extract(reply), "first();");
    }

    #[test]
    fn skips_blocks_with_other_tags_before_match() {
        let parser = FencedBlockParser::new("typescript");
        let reply = "```json\n{\"a\": 1}\n```\n```typescript\nok();\n```";
        assert_eq!(parser.extract(reply), "ok();");
    }

    #[test]
    fn tag_must_end_the_fence_line() {
        let parser = FencedBlockParser::new("ts");
        assert_eq!(parser.extract("```tsx\n<A />\n```"), "");
        assert_eq!(parser.extract("```ts.old\nold();\n```"), "");
        assert_eq!(parser.extract("```ts\nlet a = 1;\n```"), "let a = 1;");
        assert_eq!(parser.extract("```ts  \r\nlet b = 2;\r\n```"), "let b = 2;");

        let parser = FencedBlockParser::new("typescript");
        assert_eq!(parser.extract("```typescript-foo\nx();\n```"), "");
        assert_eq!(
            parser.extract("```typescript-foo\nx();\n```\n```typescript\ny();\n```"),
            "y();"
        );
    }

    #[test]
    fn unterminated_block_yields_empty() {
        let parser = FencedBlockParser::new("rust");
        assert_eq!(parser.extract("```rust\nfn main() {}\n"), "");
    }
}
