//! `PubmedArticleSet` XML reader.
//!
//! Walks the efetch document with an element stack and fills one
//! [`PaperRecord`] per `PubmedArticle`. Unknown elements are ignored.

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ClientError, ClientResult};
use crate::models::{Author, Journal, PaperRecord};

/// Parse an efetch response into records, in document order.
pub fn parse_article_set(xml: &str) -> ClientResult<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut records = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e);
                if name == "PubmedArticle" {
                    current = Some(ArticleBuilder::default());
                }
                if let Some(article) = current.as_mut() {
                    article.open(&name, e);
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                let chunk = e.unescape().map_err(|err| ClientError::parse(err.to_string()))?;
                text.push_str(&chunk);
                if let Some(article) = current.as_mut() {
                    if stack.iter().any(|s| s == "ArticleTitle") {
                        article.title.push_str(&chunk);
                    }
                    if stack.iter().any(|s| s == "AbstractText") {
                        article.section.push_str(&chunk);
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else { continue };
                let parent = stack.last().map_or("", String::as_str);
                let grandparent =
                    stack.len().checked_sub(2).and_then(|i| stack.get(i)).map_or("", String::as_str);

                if name == "PubmedArticle" {
                    if let Some(article) = current.take() {
                        match article.finish() {
                            Some(record) => records.push(record),
                            None => tracing::warn!("Skipping PubmedArticle without a PMID"),
                        }
                    }
                } else if let Some(article) = current.as_mut() {
                    article.close(&name, parent, grandparent, text.trim());
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ClientError::parse(format!("efetch XML error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

#[derive(Default)]
struct ArticleBuilder {
    record: PaperRecord,
    journal: Journal,
    author: Option<Author>,
    title: String,
    section: String,
    section_label: Option<String>,
    sections: Vec<String>,
    id_type: Option<String>,
    location_doi: Option<String>,
    date: DateParts,
}

#[derive(Default)]
struct DateParts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    medline: Option<String>,
}

impl ArticleBuilder {
    fn open(&mut self, name: &str, e: &BytesStart<'_>) {
        match name {
            "Author" => self.author = Some(Author::default()),
            "AbstractText" => {
                self.section.clear();
                self.section_label = attribute(e, "Label");
            }
            "ArticleId" => self.id_type = attribute(e, "IdType"),
            "ELocationID" => self.id_type = attribute(e, "EIdType"),
            _ => {}
        }
    }

    fn close(&mut self, name: &str, parent: &str, grandparent: &str, text: &str) {
        let owned = || text.to_string();
        match (name, parent) {
            ("PMID", "MedlineCitation") if self.record.pmid.is_empty() => {
                self.record.pmid = owned();
            }
            ("ArticleTitle", _) => self.record.title = collapse_whitespace(&self.title),
            ("AbstractText", _) => {
                let body = collapse_whitespace(&self.section);
                if !body.is_empty() {
                    self.sections.push(match self.section_label.take() {
                        Some(label) => format!("{label}: {body}"),
                        None => body,
                    });
                }
            }
            ("LastName" | "CollectiveName", "Author") => {
                if let Some(author) = self.author.as_mut() {
                    author.last_name = owned();
                }
            }
            ("ForeName", "Author") => {
                if let Some(author) = self.author.as_mut() {
                    author.fore_name = Some(owned());
                }
            }
            ("Initials", "Author") => {
                if let Some(author) = self.author.as_mut() {
                    author.initials = Some(owned());
                }
            }
            ("Affiliation", "AffiliationInfo") => {
                if let Some(author) = self.author.as_mut() {
                    author.affiliations.push(owned());
                }
            }
            ("Author", _) => {
                if let Some(author) = self.author.take().filter(|a| !a.last_name.is_empty()) {
                    self.record.authors.push(author);
                }
            }
            ("Title", "Journal") => self.journal.name = owned(),
            ("ISSN", "Journal") => self.journal.issn = Some(owned()),
            ("Volume", "JournalIssue") => self.journal.volume = Some(owned()),
            ("Issue", "JournalIssue") => self.journal.issue = Some(owned()),
            ("Year", "PubDate") => self.date.year = text.parse().ok(),
            ("Month", "PubDate") => self.date.month = parse_month(text),
            ("Day", "PubDate") => self.date.day = text.parse().ok(),
            ("MedlineDate", "PubDate") => self.date.medline = Some(owned()),
            ("PublicationType", _) => self.record.publication_types.push(owned()),
            ("DescriptorName", "MeshHeading") => self.record.mesh_terms.push(owned()),
            ("Keyword", "KeywordList") => self.record.keywords.push(owned()),
            ("ArticleId", "ArticleIdList") if grandparent == "PubmedData" => {
                match self.id_type.take().as_deref() {
                    Some("doi") => self.record.doi = Some(owned()),
                    Some("pmc") => self.record.pmcid = Some(owned()),
                    _ => {}
                }
            }
            ("ELocationID", _) => {
                if self.id_type.take().as_deref() == Some("doi") {
                    self.location_doi = Some(owned());
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Option<PaperRecord> {
        if self.record.pmid.is_empty() {
            return None;
        }
        if !self.sections.is_empty() {
            self.record.r#abstract = Some(self.sections.join("\n\n"));
        }
        if self.record.doi.is_none() {
            self.record.doi = self.location_doi;
        }
        if !self.journal.name.is_empty() {
            self.record.journal = Some(self.journal);
        }
        self.record.publication_date = self.date.resolve();
        Some(self.record)
    }
}

impl DateParts {
    /// Year/Month/Day, else the start of a MedlineDate, else January 1.
    fn resolve(&self) -> Option<NaiveDate> {
        let (year, month, day) = match (self.year, &self.medline) {
            (Some(year), _) => (year, self.month.unwrap_or(1), self.day.unwrap_or(1)),
            (None, Some(medline)) => parse_medline_date(medline)?,
            (None, None) => return None,
        };
        NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
            .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
    }
}

/// `"2019 Nov-Dec"`, `"1998 Dec-1999 Jan"`, `"2000 Spring"`.
fn parse_medline_date(raw: &str) -> Option<(i32, u32, u32)> {
    let mut tokens = raw.split(|c: char| c.is_whitespace() || c == '-');
    let year = tokens.find_map(|t| (t.len() == 4).then(|| t.parse::<i32>().ok()).flatten())?;
    let month = tokens.next().and_then(parse_month).unwrap_or(1);
    Some((year, month, 1))
}

fn parse_month(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.trim().parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix: String = raw.trim().chars().take(3).collect::<String>().to_ascii_lowercase();
    const MONTHS: [&str; 12] =
        ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">31234567</PMID>
      <Article>
        <Journal>
          <ISSN IssnType="Electronic">1474-547X</ISSN>
          <JournalIssue>
            <Volume>391</Volume>
            <Issue>10128</Issue>
            <PubDate><Year>2018</Year><Month>Apr</Month><Day>07</Day></PubDate>
          </JournalIssue>
          <Title>The Lancet</Title>
        </Journal>
        <ArticleTitle>Comparative efficacy of <i>21</i> antidepressants &amp; placebo</ArticleTitle>
        <ELocationID EIdType="doi">10.1016/S0140-6736(17)32802-7</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND">Major depressive disorder is common.</AbstractText>
          <AbstractText Label="FINDINGS">All drugs beat placebo.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author>
            <LastName>Cipriani</LastName><ForeName>Andrea</ForeName><Initials>A</Initials>
            <AffiliationInfo><Affiliation>University of Oxford</Affiliation></AffiliationInfo>
          </Author>
          <Author><CollectiveName>GRADE Working Group</CollectiveName></Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType UI="D017418">Meta-Analysis</PublicationType>
          <PublicationType UI="D016454">Review</PublicationType>
        </PublicationTypeList>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D003865">Depressive Disorder, Major</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <KeywordList><Keyword>antidepressants</Keyword></KeywordList>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID>11111111</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31234567</ArticleId>
        <ArticleId IdType="pmc">PMC5889788</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference><ArticleIdList><ArticleId IdType="doi">10.9999/other</ArticleId></ArticleIdList></Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>22222222</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><MedlineDate>1998 Dec-1999 Jan</MedlineDate></PubDate></JournalIssue>
          <Title>Obscure Letters</Title>
        </Journal>
        <ArticleTitle>Short note</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parses_full_article() {
        let records = parse_article_set(ARTICLE).unwrap();
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.pmid, "31234567");
        assert_eq!(r.title, "Comparative efficacy of 21 antidepressants & placebo");
        assert_eq!(r.doi.as_deref(), Some("10.1016/S0140-6736(17)32802-7"));
        assert_eq!(r.pmcid.as_deref(), Some("PMC5889788"));
        assert_eq!(r.publication_date, NaiveDate::from_ymd_opt(2018, 4, 7));
        assert_eq!(r.journal_name(), Some("The Lancet"));
        assert_eq!(r.journal.as_ref().unwrap().volume.as_deref(), Some("391"));
        assert_eq!(r.authors.len(), 2);
        assert_eq!(r.authors[0].fore_name.as_deref(), Some("Andrea"));
        assert_eq!(r.authors[0].affiliations, vec!["University of Oxford".to_string()]);
        assert_eq!(r.authors[1].last_name, "GRADE Working Group");
        assert_eq!(r.publication_types, vec!["Meta-Analysis", "Review"]);
        assert_eq!(r.mesh_terms, vec!["Depressive Disorder, Major"]);
        assert_eq!(r.keywords, vec!["antidepressants"]);
        let abstract_text = r.r#abstract.as_deref().unwrap();
        assert!(abstract_text.starts_with("BACKGROUND: Major depressive"));
        assert!(abstract_text.contains("FINDINGS: All drugs"));
    }

    #[test]
    fn test_medline_date_fallback() {
        let records = parse_article_set(ARTICLE).unwrap();
        assert_eq!(records[1].publication_date, NaiveDate::from_ymd_opt(1998, 12, 1));
        assert!(records[1].doi.is_none());
        assert!(records[1].r#abstract.is_none());
    }

    #[test]
    fn test_month_parsing() {
        assert_eq!(parse_month("Sep"), Some(9));
        assert_eq!(parse_month("09"), Some(9));
        assert_eq!(parse_month("13"), None);
        assert_eq!(parse_month("Spring"), None);
        assert_eq!(parse_medline_date("2000 Spring"), Some((2000, 1, 1)));
    }

    #[test]
    fn test_empty_set_and_malformed() {
        assert!(parse_article_set("<PubmedArticleSet></PubmedArticleSet>").unwrap().is_empty());
        assert!(parse_article_set("<PubmedArticleSet><PubmedArticle></Oops>").is_err());
    }
}
