use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

/// Scheme used when the dapp has no wallet-specific endpoint to target.
pub const ASSOCIATION_SCHEME: &str = "solana-wallet";

const LOCAL_ASSOCIATION_PATH: [&str; 3] = ["v1", "associate", "local"];

static DEFAULT_ENDPOINT: LazyLock<Url> = LazyLock::new(|| {
    Url::parse(&format!("{ASSOCIATION_SCHEME}:/v1/associate/local"))
        .expect("static association endpoint is a valid URL")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("invalid URI: {0}")]
    Invalid(String),
    #[error("URI prefix must be hierarchical: {0}")]
    NotHierarchical(String),
    #[error("not a local association URI: {0}")]
    NotLocalAssociation(String),
    #[error("missing query parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// A wallet-specific endpoint prefix (usually an `AuthorizationResult::wallet_uri_base`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPrefix(Url);

impl UriPrefix {
    pub fn parse(s: &str) -> Result<Self, UriError> {
        let url = Url::parse(s).map_err(|e| UriError::Invalid(format!("{s}: {e}")))?;
        Self::try_from(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<Url> for UriPrefix {
    type Error = UriError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        if url.cannot_be_a_base() {
            return Err(UriError::NotHierarchical(url.to_string()));
        }
        Ok(Self(url))
    }
}

impl fmt::Display for UriPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The dispatchable "open the wallet" URI for one local association.
///
/// `association` is the session token, base64url without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationUri {
    pub prefix: Option<UriPrefix>,
    pub port: u16,
    pub association: String,
}

impl AssociationUri {
    pub fn to_url(&self) -> Url {
        let mut url = match &self.prefix {
            Some(prefix) => {
                let mut url = prefix.0.clone();
                url.set_query(None);
                url.set_fragment(None);
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.pop_if_empty().extend(LOCAL_ASSOCIATION_PATH);
                }
                url
            }
            None => DEFAULT_ENDPOINT.clone(),
        };
        url.query_pairs_mut()
            .append_pair("association", &self.association)
            .append_pair("port", &self.port.to_string());
        url
    }

    /// Inverse of [`AssociationUri::to_url`], used by the wallet side.
    pub fn parse(s: &str) -> Result<Self, UriError> {
        let url = Url::parse(s).map_err(|e| UriError::Invalid(format!("{s}: {e}")))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segs| segs.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < LOCAL_ASSOCIATION_PATH.len()
            || segments[segments.len() - LOCAL_ASSOCIATION_PATH.len()..] != LOCAL_ASSOCIATION_PATH
        {
            return Err(UriError::NotLocalAssociation(s.to_string()));
        }

        let mut association = None;
        let mut port = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "association" => association = Some(value.into_owned()),
                "port" => port = Some(value.into_owned()),
                _ => {}
            }
        }

        let association = association
            .filter(|a| !a.is_empty())
            .ok_or(UriError::MissingParameter("association"))?;
        let port = port.ok_or(UriError::MissingParameter("port"))?;
        let port = match port.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(UriError::InvalidPort(port)),
        };

        let prefix = if url.scheme() == ASSOCIATION_SCHEME {
            None
        } else {
            let mut base = url.clone();
            base.set_query(None);
            if let Ok(mut segs) = base.path_segments_mut() {
                segs.pop().pop().pop();
            }
            UriPrefix::try_from(base).ok()
        };

        Ok(Self {
            prefix,
            port,
            association,
        })
    }
}

impl fmt::Display for AssociationUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scheme_form() {
        let uri = AssociationUri {
            prefix: None,
            port: 50123,
            association: "dG9rZW4".to_string(),
        };
        assert_eq!(
            uri.to_string(),
            "solana-wallet:/v1/associate/local?association=dG9rZW4&port=50123"
        );
    }

    #[test]
    fn prefix_form_appends_path() {
        let prefix = UriPrefix::parse("https://wallet.example.com/mwa/").unwrap();
        let uri = AssociationUri {
            prefix: Some(prefix.clone()),
            port: 60000,
            association: "abc".to_string(),
        };
        assert_eq!(
            uri.to_string(),
            "https://wallet.example.com/mwa/v1/associate/local?association=abc&port=60000"
        );

        // Missing trailing slash is treated the same way.
        let prefix = UriPrefix::parse("https://wallet.example.com/mwa").unwrap();
        let uri = AssociationUri {
            prefix: Some(prefix),
            ..uri
        };
        assert!(
            uri.to_string()
                .starts_with("https://wallet.example.com/mwa/v1/associate/local?")
        );
    }

    #[test]
    fn parse_recovers_fields() {
        let uri = AssociationUri {
            prefix: Some(UriPrefix::parse("https://wallet.example.com/").unwrap()),
            port: 49152,
            association: "x-y_z".to_string(),
        };
        let parsed = AssociationUri::parse(&uri.to_string()).unwrap();
        assert_eq!(parsed.port, 49152);
        assert_eq!(parsed.association, "x-y_z");
        assert_eq!(
            parsed.prefix.unwrap().as_url().as_str(),
            "https://wallet.example.com/"
        );

        let parsed =
            AssociationUri::parse("solana-wallet:/v1/associate/local?association=a&port=1")
                .unwrap();
        assert!(parsed.prefix.is_none());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            AssociationUri::parse("solana-wallet:/v1/associate/remote?association=a&port=1"),
            Err(UriError::NotLocalAssociation(
                "solana-wallet:/v1/associate/remote?association=a&port=1".to_string()
            ))
        );
        assert_eq!(
            AssociationUri::parse("solana-wallet:/v1/associate/local?port=1"),
            Err(UriError::MissingParameter("association"))
        );
        assert_eq!(
            AssociationUri::parse("solana-wallet:/v1/associate/local?association=a"),
            Err(UriError::MissingParameter("port"))
        );
        assert_eq!(
            AssociationUri::parse("solana-wallet:/v1/associate/local?association=a&port=0"),
            Err(UriError::InvalidPort("0".to_string()))
        );
        assert_eq!(
            AssociationUri::parse("solana-wallet:/v1/associate/local?association=a&port=70000"),
            Err(UriError::InvalidPort("70000".to_string()))
        );
    }

    #[test]
    fn opaque_prefix_is_rejected() {
        assert!(matches!(
            UriPrefix::parse("mailto:someone@example.com"),
            Err(UriError::NotHierarchical(_))
        ));
    }
}
