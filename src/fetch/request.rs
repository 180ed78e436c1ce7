use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Uri, header::HeaderName};
use mime_guess::from_path;

/// 请求模式，对应浏览器的 `Sec-Fetch-Mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// 整页导航
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "no-cors" => Some(Self::NoCors),
            "cors" => Some(Self::Cors),
            _ => None,
        }
    }
}

/// 请求目标类型，对应浏览器的 `Sec-Fetch-Dest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Manifest,
    Font,
    #[default]
    Other,
}

impl Destination {
    pub fn from_header(value: &str) -> Option<Self> {
        let dest = match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "image" => Self::Image,
            "script" | "worker" | "sharedworker" => Self::Script,
            "style" => Self::Style,
            "manifest" => Self::Manifest,
            "font" => Self::Font,
            "empty" | "" => Self::Other,
            _ => return None,
        };
        Some(dest)
    }

    /// 没有 `Sec-Fetch-Dest` 时根据路径后缀推断
    pub fn guess_from_path(path: &str) -> Self {
        let Some(mime) = from_path(path).first() else {
            return Self::Other;
        };
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("image", _) => Self::Image,
            ("text", "html") => Self::Document,
            ("text", "css") => Self::Style,
            ("text", "javascript") | ("application", "javascript") => Self::Script,
            ("font", _) => Self::Font,
            ("application", "manifest+json") => Self::Manifest,
            _ => Self::Other,
        }
    }
}

/// 一次被代理拦截的出站请求
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub destination: Destination,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            destination: Destination::default(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    /// 整页导航请求（地址栏输入、刷新、链接跳转）
    pub fn navigate(uri: Uri) -> Self {
        Self::get(uri)
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Document)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 只有 GET 被视为纯读请求
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_http(&self) -> bool {
        matches!(self.uri.scheme_str(), Some("http") | Some("https"))
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn is_image(&self) -> bool {
        self.destination == Destination::Image
    }

    /// 完整请求地址，即 `Uri` 的字符串形式
    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// 请求是否与给定 origin（`scheme://authority`）同源
    pub fn is_same_origin(&self, origin: &Uri) -> bool {
        self.uri.scheme() == origin.scheme() && self.uri.authority() == origin.authority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mode_from_header() {
        assert_eq!(
            RequestMode::from_header("navigate"),
            Some(RequestMode::Navigate)
        );
        assert_eq!(RequestMode::from_header("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::from_header("websocket"), None);
    }

    #[test]
    fn test_destination_guess_from_path() {
        assert_eq!(
            Destination::guess_from_path("/images/cat.png"),
            Destination::Image
        );
        assert_eq!(Destination::guess_from_path("/style.css"), Destination::Style);
        assert_eq!(Destination::guess_from_path("/js/main.js"), Destination::Script);
        assert_eq!(Destination::guess_from_path("/api/data"), Destination::Other);
    }

    #[test]
    fn test_request_scheme_checks() {
        let req = ProxyRequest::get(Uri::from_static("https://cats.example/index.html"));
        assert!(req.is_read());
        assert!(req.is_http());

        let req = ProxyRequest::get(Uri::from_static("chrome-extension://abcdef/script.js"));
        assert!(!req.is_http());

        let req = ProxyRequest::new(Method::POST, Uri::from_static("http://cats.example/api"));
        assert!(!req.is_read());
    }

    #[test]
    fn test_url_keeps_query() {
        let req = ProxyRequest::get(Uri::from_static("http://cats.example/gallery?page=2"));
        assert_eq!(req.url(), "http://cats.example/gallery?page=2");
    }

    #[test]
    fn test_same_origin() {
        let origin = Uri::from_static("http://127.0.0.1:8080");
        let req = ProxyRequest::get(Uri::from_static("http://127.0.0.1:8080/style.css"));
        assert!(req.is_same_origin(&origin));

        let req = ProxyRequest::get(Uri::from_static("http://cdn.example/cat.png"));
        assert!(!req.is_same_origin(&origin));
    }
}
