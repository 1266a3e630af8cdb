use crate::{path, ResourceId};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Response, StatusCode};

/// A decoded `MockTarget`: canned responses served in place of an upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockTarget {
    pub id: ResourceId,
    pub routes: Vec<MockRoute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockRoute {
    pub path: String,

    /// An empty list matches every method.
    pub methods: Vec<Method>,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

impl MockTarget {
    /// Finds the first route, in declaration order, that serves `method` at `path`.
    pub fn find(&self, method: &Method, request_path: &str) -> Option<&MockRoute> {
        self.routes
            .iter()
            .find(|route| route.matches(method, request_path))
    }
}

impl MockRoute {
    pub fn matches(&self, method: &Method, request_path: &str) -> bool {
        path::same_path(&self.path, request_path)
            && (self.methods.is_empty() || self.methods.contains(method))
    }

    pub fn to_response(&self) -> Response<Bytes> {
        let mut rsp = Response::new(self.body.clone());
        *rsp.status_mut() = self.status;
        let headers = rsp.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        rsp
    }
}
