pub mod scraper;
