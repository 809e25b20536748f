use crate::fingerprint::compute_fingerprint;
use crate::html::{decode_content, is_html, HtmlExtractor, MarkupExtractor};
use crate::index::{DocId, Posting};
use crate::router::IndexRouter;
use crate::tokenizer::{remove_stopwords, token_frequency};
use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// One stored crawl record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NotHtml,
    DuplicateUrl,
    NearDuplicate,
    LowInformation,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NotHtml => "not html",
            SkipReason::DuplicateUrl => "duplicate url",
            SkipReason::NearDuplicate => "near duplicate",
            SkipReason::LowInformation => "low information",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Indexed(DocId),
    Skipped(SkipReason),
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

impl IndexRouter {
    pub fn add_document(&mut self, doc: &RawDocument) -> Result<Ingested> {
        self.add_document_with(doc, &HtmlExtractor)
    }

    /// Run one document through the ingestion pipeline.
    ///
    /// Rejections are reported as `Ingested::Skipped` and leave the index untouched,
    /// except that a fingerprint which passed the near-duplicate gate stays registered.
    pub fn add_document_with<E: MarkupExtractor>(&mut self, doc: &RawDocument, extractor: &E) -> Result<Ingested> {
        let content = decode_content(&doc.content, &doc.encoding);
        if !is_html(&content) {
            return Ok(self.skip(doc, SkipReason::NotHtml));
        }
        if self.documents.contains_url(&doc.url) {
            return Ok(self.skip(doc, SkipReason::DuplicateUrl));
        }

        let cleaned = extractor.clean(&content);
        let mut tokens = extractor.tokenize(&cleaned);
        if self.config.drop_stopwords {
            tokens = remove_stopwords(tokens);
        }
        let links = extractor.links(&cleaned);

        if !self.fingerprints.add(compute_fingerprint(&tokens)) {
            return Ok(self.skip(doc, SkipReason::NearDuplicate));
        }

        let frequencies = token_frequency(&tokens);
        if frequencies.len() < self.config.min_distinct_tokens {
            return Ok(self.skip(doc, SkipReason::LowInformation));
        }

        let title = non_empty(extractor.title(&content));
        let description = non_empty(extractor.description(&content));
        let id = self.documents.register(&doc.url, title, description);

        let base = Url::parse(&doc.url).ok();
        for href in &links {
            if let Some(target) = self.policy.canonicalize(base.as_ref(), href) {
                self.votes.vote(&target);
            }
        }

        for (token, occurrences) in &frequencies {
            self.add_token(token, Posting::new(id, *occurrences))?;
        }
        tracing::debug!(doc_id = id, url = %doc.url, tokens = frequencies.len(), links = links.len(), "indexed document");
        Ok(Ingested::Indexed(id))
    }

    fn skip(&self, doc: &RawDocument, reason: SkipReason) -> Ingested {
        tracing::debug!(url = %doc.url, %reason, "skipped document");
        Ingested::Skipped(reason)
    }
}
