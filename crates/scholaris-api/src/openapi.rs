// SPDX-License-Identifier: Apache-2.0

use serde_json::{json, Value};

use crate::{API_VERSION, SYSTEM_NAME};

#[must_use]
pub fn openapi_v1_spec() -> Value {
    json!({
      "openapi": "3.0.3",
      "info": {
        "title": SYSTEM_NAME,
        "version": API_VERSION
      },
      "paths": {
        "/": {"get": {"responses": {"200": {"description": "service identity"}}}},
        "/api/author_coauthors": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["author_id"],
              "properties": {"author_id": {"type": "string"}}
            }}}},
            "responses": {
              "200": {"description": "co-author documents"},
              "422": {"description": "invalid body", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/author_publications": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["author_id"],
              "properties": {
                "author_id": {"type": "string"},
                "size": {"type": "integer", "minimum": 0, "default": 100, "description": "0 fetches every publication"},
                "from_": {"type": "integer", "minimum": 0, "default": 0},
                "filters": {"type": "object"}
              }
            }}}},
            "responses": {
              "200": {"description": "publication page with execution time"},
              "422": {"description": "invalid body", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/authors/{author_id}": {
          "get": {
            "parameters": [{"name": "author_id", "in": "path", "required": true, "schema": {"type": "string"}}],
            "responses": {
              "200": {"description": "author document"},
              "404": {"description": "unknown author", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/authors_bulk": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["ids"],
              "properties": {
                "ids": {"type": "array", "items": {"type": "string"}, "description": "truncated to 100"},
                "fields": {"type": "array", "items": {"type": "string"}}
              }
            }}}},
            "responses": {"200": {"description": "author documents, placeholders for unknown IDs"}}
          }
        },
        "/api/cluster": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["query", "clustering_params"],
              "properties": {
                "query": {"type": "string"},
                "size": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 50},
                "search_method": {"type": "string", "default": "hybrid"},
                "clustering_params": {"$ref": "#/components/schemas/ClusteringParams"},
                "filters": {"$ref": "#/components/schemas/SearchFilter"}
              }
            }}}},
            "responses": {
              "200": {"description": "search results with cluster labels, clustering and affiliation analysis"},
              "422": {"description": "invalid body", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "503": {"description": "embedder unavailable", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/index_stats": {
          "get": {
            "responses": {
              "200": {"description": "article and author index statistics"},
              "502": {"description": "search backend failure", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/publications/{publication_id}": {
          "get": {
            "parameters": [{"name": "publication_id", "in": "path", "required": true, "schema": {"type": "string"}}],
            "responses": {
              "200": {"description": "publication source document"},
              "404": {"description": "unknown publication", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/publications_by_ids": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["ids"],
              "properties": {
                "ids": {"type": "array", "items": {"type": "string"}},
                "filters": {"type": "object"}
              }
            }}}},
            "responses": {"200": {"description": "matched publications in batch order"}}
          }
        },
        "/api/search": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["query"],
              "properties": {
                "query": {"type": "string"},
                "size": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 20},
                "from_": {"type": "integer", "minimum": 0, "default": 0},
                "search_method": {"type": "string", "default": "hybrid", "description": "text, semantic, or anything else for hybrid"},
                "filters": {"$ref": "#/components/schemas/SearchFilter"},
                "include_facets": {"type": "boolean", "default": true}
              }
            }}}},
            "responses": {
              "200": {"description": "scored hits plus facets"},
              "422": {"description": "invalid body", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "429": {"description": "concurrency limits", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "503": {"description": "embedder unavailable", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/api/search_authors": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["query"],
              "properties": {
                "query": {"type": "string"},
                "size": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 20}
              }
            }}}},
            "responses": {"200": {"description": "scored author matches"}}
          }
        },
        "/api/topic_analysis": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["query"],
              "properties": {
                "query": {"type": "string"},
                "top_n": {"type": "integer", "minimum": 1, "default": 10},
                "size": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 1000}
              }
            }}}},
            "responses": {
              "200": {"description": "affiliation distribution for the topic"},
              "400": {"description": "no publications matched", "content": {"application/json": {"schema": {"type": "object", "properties": {"detail": {"type": "string"}}}}}}
            }
          }
        },
        "/api/unit_collaborations": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["unit"],
              "properties": {"unit": {"type": "string"}}
            }}}},
            "responses": {"200": {"description": "joint-publication counts per collaborating unit"}}
          }
        },
        "/api/unit_publications": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["unit"],
              "properties": {
                "unit": {"type": "string"},
                "size": {"type": "integer", "minimum": 0, "description": "absent or 0 fetches everything"},
                "from_": {"type": "integer", "minimum": 0, "default": 0},
                "cluster_results": {"type": "boolean", "default": true},
                "lite": {"type": "boolean", "default": true},
                "filters": {"$ref": "#/components/schemas/SearchFilter"}
              }
            }}}},
            "responses": {
              "200": {"description": "unit publications with analytics and optional clustering"},
              "400": {"description": "unit lookup failed", "content": {"application/json": {"schema": {"type": "object", "properties": {"detail": {"type": "string"}}}}}}
            }
          }
        },
        "/api/unit_publications_count": {
          "post": {
            "requestBody": {"required": true, "content": {"application/json": {"schema": {
              "type": "object",
              "required": ["unit"],
              "properties": {"unit": {"type": "string"}}
            }}}},
            "responses": {"200": {"description": "publication count, 0 when lookups fail"}}
          }
        },
        "/healthz": {"get": {"responses": {"200": {"description": "ok"}}}},
        "/metrics": {"get": {"responses": {"200": {"description": "prometheus metrics"}}}},
        "/readyz": {"get": {"responses": {"200": {"description": "ready"}, "503": {"description": "not ready"}}}}
      },
      "components": {
        "schemas": {
          "ApiError": {
            "type": "object",
            "required": ["code", "message", "details"],
            "additionalProperties": false,
            "properties": {
              "code": {"$ref": "#/components/schemas/ApiErrorCode"},
              "message": {"type": "string"},
              "details": {"type": "object"}
            }
          },
          "ApiErrorCode": {
            "type": "string",
            "enum": [
              "InvalidParameter",
              "NotFound",
              "RateLimited",
              "NotReady",
              "Upstream",
              "Internal"
            ]
          },
          "ClusteringParams": {
            "type": "object",
            "properties": {
              "method": {"type": "string", "default": "auto", "description": "auto, kmeans, hierarchical, adaptive; unknown methods degrade to adaptive kmeans"},
              "max_clusters": {"type": "integer", "minimum": 1, "default": 10},
              "min_cluster_size": {"type": "integer", "minimum": 0, "default": 3}
            }
          },
          "SearchFilter": {
            "type": "object",
            "properties": {
              "publication_year": {"type": "object", "description": "range bounds such as gte/lte, non-negative"},
              "keywords": {"type": "array"},
              "publication_type": {"oneOf": [{"type": "string"}, {"type": "array", "items": {"type": "string"}}]}
            }
          }
        }
      }
    })
}
